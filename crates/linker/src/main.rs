use clap::Parser;
use databuild_config::{Config, Overrides, PathOverrides};
use databuild_linker::{LinkOutcome, Linker};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Link compiled data into a content-addressed archive.
///
/// Long options may be given with a single dash (`-name Game`).
#[derive(Debug, Parser)]
#[command(name = "databuild-link", version, about)]
struct Cli {
    /// Archive (and root node) name.
    #[arg(long)]
    name: Option<String>,
    /// Target platform, substituted for %PLATFORM% in paths.
    #[arg(long)]
    platform: Option<String>,
    /// Source asset root.
    #[arg(long = "srcpath")]
    src_path: Option<PathBuf>,
    /// Compiled data root, holding node files and the file entry cache.
    #[arg(long = "dstpath")]
    dst_path: Option<PathBuf>,
    /// Dependency record root.
    #[arg(long = "deppath")]
    dep_path: Option<PathBuf>,
    /// Publish root the archive is written to.
    #[arg(long = "pubpath")]
    pub_path: Option<PathBuf>,
    /// Config file (TOML, YAML or JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Also write the archive payload; without it only the tables are written.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    bigfile: Option<bool>,
    /// Hashing threads (0 = one per core).
    #[arg(long)]
    threads: Option<usize>,
}
impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            name: self.name.clone(),
            platform: self.platform.clone(),
            paths: PathOverrides {
                src: self.src_path.clone(),
                dst: self.dst_path.clone(),
                dep: self.dep_path.clone(),
                publish: self.pub_path.clone(),
            },
            build_bigfile: self.bigfile,
            threads: self.threads,
        }
    }
}

/// `-name` style long options become `--name`; short flags and values are
/// left alone.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let single_dash_long = i > 0
                && arg.len() > 2
                && arg.starts_with('-')
                && !arg.starts_with("--")
                && arg[1..].starts_with(|c: char| c.is_ascii_alphabetic());
            match single_dash_long {
                true => format!("-{arg}"),
                false => arg,
            }
        })
        .collect()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args())) {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests end up here too.
            let _ = e.print();
            return match e.use_stderr() {
                true => ExitCode::FAILURE,
                false => ExitCode::SUCCESS,
            };
        },
    };

    let config = match Config::load(cli.config.as_deref(), &cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = ?e, "Invalid configuration");
            return ExitCode::FAILURE;
        },
    };
    tracing::info!(name = %config.name, platform = %config.platform, "databuild-link {}", env!("CARGO_PKG_VERSION"));

    match Linker::new(&config).and_then(|linker| linker.run()) {
        Ok(LinkOutcome::UpToDate) => ExitCode::SUCCESS,
        Ok(LinkOutcome::Linked { entries, instances }) => {
            tracing::info!(entries, instances, "Linked");
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!(error = ?e, "Link failed");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        let args = std::iter::once("databuild-link").chain(args.iter().copied()).map(String::from);
        Cli::try_parse_from(normalize_args(args)).unwrap()
    }

    #[rstest]
    #[case(&["-name", "Game", "-dstpath", "Bin"])]
    #[case(&["--name", "Game", "--dstpath", "Bin"])]
    #[case(&["-name=Game", "-dstpath=Bin"])]
    fn test_single_and_double_dash(#[case] args: &[&str]) {
        let cli = parse(args);
        assert_eq!(cli.name.as_deref(), Some("Game"));
        assert_eq!(cli.dst_path, Some(PathBuf::from("Bin")));
    }

    #[rstest]
    #[case(&[], None)]
    #[case(&["-bigfile"], Some(true))]
    #[case(&["-bigfile", "false"], Some(false))]
    #[case(&["-bigfile", "-name", "Game"], Some(true))]
    fn test_bigfile_flag(#[case] args: &[&str], #[case] expected: Option<bool>) {
        assert_eq!(parse(args).bigfile, expected);
    }

    #[test]
    fn test_normalize_args() {
        let args = ["databuild-link", "-name", "Game", "-threads", "-1", "-h", "--config"].map(String::from);
        assert_eq!(normalize_args(args), ["databuild-link", "--name", "Game", "--threads", "-1", "-h", "--config"]);
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&["-name", "Game", "-pubpath", "Publish", "-threads", "2"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.paths.publish, Some(PathBuf::from("Publish")));
        assert_eq!(overrides.threads, Some(2));
        assert!(overrides.build_bigfile.is_none());
    }
}
