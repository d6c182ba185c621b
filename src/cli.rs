use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "nkimg",
    version,
    about = "Neko disk image builder",
    long_about = "Build a 16 MiB bootable disk image: boot sector, bootloader, MBR and a FAT16 partition filled from a host directory"
)]
#[command(group(ArgGroup::new("content").required(true).args(["root", "kernel"])))]
pub struct Args {
    /// Boot sector (at most 512 bytes, copied to sector 0)
    #[arg(short = 's', long = "boot-sector", value_name = "PATH")]
    pub boot_sector: PathBuf,

    /// Bootloader (copied to sector 1, must end before the partition)
    #[arg(short = 'l', long = "bootloader", value_name = "PATH")]
    pub bootloader: PathBuf,

    /// Directory copied recursively into the FAT partition
    #[arg(short = 'r', long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Single file placed in the root directory under its own name
    #[arg(short = 'k', long = "kernel", value_name = "PATH")]
    pub kernel: Option<PathBuf>,

    /// Output image path
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: PathBuf,

    /// Volume label (at most 11 characters)
    #[arg(long = "label", default_value = "NEKO")]
    pub label: String,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root_variant() {
        let args = Args::try_parse_from([
            "nkimg", "-s", "boot.bin", "-l", "loader.bin", "-r", "fs", "-o", "disk.img",
        ])
        .unwrap();
        assert_eq!(args.root, Some(PathBuf::from("fs")));
        assert_eq!(args.kernel, None);
        assert_eq!(args.label, "NEKO");
        assert!(!args.verbose);
    }

    #[test]
    fn test_parse_kernel_variant() {
        let args = Args::try_parse_from([
            "nkimg", "-s", "b", "-l", "l", "-k", "KERNEL", "-o", "o", "--label", "BOOT", "-v",
        ])
        .unwrap();
        assert_eq!(args.kernel, Some(PathBuf::from("KERNEL")));
        assert_eq!(args.label, "BOOT");
        assert!(args.verbose);
    }

    #[test]
    fn test_missing_flags_rejected() {
        assert!(Args::try_parse_from(["nkimg", "-s", "b", "-l", "l", "-r", "fs"]).is_err());
        assert!(Args::try_parse_from(["nkimg", "-s", "b", "-l", "l", "-o", "o"]).is_err());
        assert!(
            Args::try_parse_from(["nkimg", "-s", "b", "-l", "l", "-r", "a", "-k", "b", "-o", "o"])
                .is_err()
        );
    }
}
