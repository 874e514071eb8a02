use clap::Parser;
use std::path::PathBuf;

/// Prints the ETW provider GUID compiled into a built WinCopyS3 assembly
#[derive(Parser, Debug)]
#[command(
    name = "guidprobe",
    about = "Prints the ETW provider GUID compiled into a built WinCopyS3 assembly",
    version,
    author,
    long_about = "guidprobe locates the built WinCopyS3.dll, reads its .NET metadata and \
                  prints the value of WinCopyS3.ETWEvents.ProviderGuid, whether it is a \
                  static field or a static property. No code from the assembly is run.\n\n\
                  Exit codes:\n  \
                  0  the GUID was printed\n  \
                  2  the assembly could not be found\n  \
                  3  the assembly could not be loaded\n  \
                  4  the ETWEvents type is missing\n  \
                  5  the ProviderGuid member is missing\n\n\
                  Examples:\n  \
                  guidprobe\n  \
                  guidprobe ../src/WinCopyS3/bin/Debug/net8.0-windows/WinCopyS3.dll\n  \
                  guidprobe -v /path/to/WinCopyS3.dll"
)]
pub struct CliArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to the assembly, absolute or relative to the working directory \
                (defaults to the Release build output)"
    )]
    pub assembly_path: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}
