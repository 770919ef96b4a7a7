//! VFSX CLI - probe a decision process through the bridge
//!
//! Usage:
//!   vfsx check unlink /srv/share secret.txt     Ask for a verdict without touching disk
//!   vfsx exec --root ./share read notes.txt     Run a real operation through the interceptor

use std::io::{self, SeekFrom, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vfsx::{
    Arg, Bridge, BridgeConfig, Decision, FileSystem, Intercepted, LocalFs, Mode, OpKind,
    OperationDescriptor,
};

/// VFSX CLI - talk to a decision process the way a file server would
#[derive(Parser, Debug)]
#[command(name = "vfsx")]
#[command(about = "Probe a VFSX decision process")]
struct Cli {
    /// JSON bridge config (socket_path, mode, diagnostic_log)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Decision process socket, overriding config and VFSX_SOCKET
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Append every message to this file
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one operation in gate mode and print the verdict
    Check {
        /// Operation name, e.g. open or rename
        operation: OpKind,
        /// Share root
        root: String,
        /// Primary path followed by extra arguments
        tail: Vec<String>,
    },
    /// Run one operation on a local directory through the interceptor
    Exec {
        /// Directory served as the share
        #[arg(long)]
        root: PathBuf,
        /// Interception mode, overriding config and VFSX_MODE
        #[arg(long)]
        mode: Option<Mode>,
        /// Operation name
        operation: OpKind,
        /// Operation arguments
        args: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("vfsx: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("read config {}", path.display()))?,
        None => BridgeConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }
    if let Some(log) = cli.log {
        config.diagnostic_log = Some(log);
    }

    match cli.command {
        Command::Check {
            operation,
            root,
            tail,
        } => {
            config.mode = Mode::Gate;
            check(&config, describe(operation, &root, &tail))
        }
        Command::Exec {
            root,
            mode,
            operation,
            args,
        } => {
            if let Some(mode) = mode {
                config.mode = mode;
            }
            exec(&config, root, operation, &args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Build a descriptor from command-line fields.
fn describe(kind: OpKind, root: &str, tail: &[String]) -> OperationDescriptor {
    match tail.split_first() {
        Some((path, extra)) => OperationDescriptor::with_path(
            kind,
            root,
            path.as_str(),
            extra.iter().map(|arg| Arg::from(arg.as_str())).collect(),
        ),
        None => OperationDescriptor::new(kind, root),
    }
}

fn check(config: &BridgeConfig, descriptor: OperationDescriptor) -> anyhow::Result<ExitCode> {
    let mut bridge = Bridge::new(config);
    let outcome = bridge.intercept(&descriptor);

    match outcome.verdict {
        Some(verdict) => println!("verdict: {}", verdict),
        None => println!(
            "verdict: none (decision process unreachable at {})",
            config.socket_path.display()
        ),
    }
    match outcome.decision {
        Decision::Proceed => {
            println!("decision: proceed");
            Ok(ExitCode::SUCCESS)
        }
        Decision::Deny => {
            println!("decision: deny");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn exec(config: &BridgeConfig, root: PathBuf, kind: OpKind, args: &[String]) -> anyhow::Result<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("share root {}", root.display()))?;
    let root_path = root.to_string_lossy().into_owned();
    tracing::debug!(root = %root_path, mode = %config.mode, operation = %kind, "exec");
    let mut fs = Intercepted::new(LocalFs::new(&root), Bridge::new(config), root_path);

    let user = std::env::var("USER").unwrap_or_else(|_| "nobody".to_string());
    fs.connect("vfsx", &user).context("connect")?;
    let result = exec_one(&mut fs, kind, args);
    fs.disconnect();
    result
}

fn exec_one(fs: &mut Intercepted<LocalFs>, kind: OpKind, args: &[String]) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    match kind {
        OpKind::Connect | OpKind::Disconnect => {
            // Every exec already runs inside connect/disconnect
        }
        OpKind::Opendir => {
            for name in fs.opendir(arg(args, 0, "."))? {
                writeln!(stdout, "{}", name)?;
            }
        }
        OpKind::Mkdir => fs.mkdir(required(args, 0, "path")?, octal(arg(args, 1, "755"))?)?,
        OpKind::Rmdir => fs.rmdir(required(args, 0, "path")?)?,
        OpKind::Open => {
            let flags = number(arg(args, 1, "0"))?;
            let mode = octal(arg(args, 2, "644"))?;
            let file = fs.open(required(args, 0, "path")?, flags, mode)?;
            fs.close(file)?;
        }
        OpKind::Close => {
            let file = fs.open(required(args, 0, "path")?, libc::O_RDONLY, 0)?;
            fs.close(file)?;
        }
        OpKind::Create => {
            let file = fs.create(required(args, 0, "path")?)?;
            fs.close(file)?;
        }
        OpKind::Read => {
            let mut file = fs.open(required(args, 0, "path")?, libc::O_RDONLY, 0)?;
            let mut buf = [0u8; 8192];
            loop {
                let n = fs.read(&mut file, &mut buf)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
            }
            fs.close(file)?;
        }
        OpKind::Write => {
            let data = required(args, 1, "data")?;
            let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC;
            let mut file = fs.open(required(args, 0, "path")?, flags, 0o644)?;
            fs.write(&mut file, data.as_bytes())?;
            fs.close(file)?;
        }
        OpKind::Pread => {
            let offset = number(arg(args, 1, "0"))?;
            let len: usize = number(arg(args, 2, "4096"))?;
            let mut file = fs.open(required(args, 0, "path")?, libc::O_RDONLY, 0)?;
            let mut buf = vec![0u8; len];
            let n = fs.pread(&mut file, &mut buf, offset)?;
            stdout.write_all(&buf[..n])?;
            fs.close(file)?;
        }
        OpKind::Pwrite => {
            let offset = number(required(args, 1, "offset")?)?;
            let data = required(args, 2, "data")?;
            let flags = libc::O_WRONLY | libc::O_CREAT;
            let mut file = fs.open(required(args, 0, "path")?, flags, 0o644)?;
            fs.pwrite(&mut file, data.as_bytes(), offset)?;
            fs.close(file)?;
        }
        OpKind::Lseek => {
            let offset = number(arg(args, 1, "0"))?;
            let mut file = fs.open(required(args, 0, "path")?, libc::O_RDONLY, 0)?;
            let pos = fs.lseek(&mut file, SeekFrom::Start(offset))?;
            writeln!(stdout, "{}", pos)?;
            fs.close(file)?;
        }
        OpKind::Rename => fs.rename(required(args, 0, "from")?, required(args, 1, "to")?)?,
        OpKind::Unlink => fs.unlink(required(args, 0, "path")?)?,
    }
    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, default: &'a str) -> &'a str {
    args.get(index).map_or(default, String::as_str)
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> anyhow::Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value),
        None => bail!("missing argument: {}", name),
    }
}

fn number<T: std::str::FromStr>(value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid number: {}", value))
}

fn octal(value: &str) -> anyhow::Result<u32> {
    u32::from_str_radix(value.trim_start_matches("0o"), 8)
        .with_context(|| format!("invalid octal mode: {}", value))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_describe_from_tail() {
        let descriptor = describe(OpKind::Rename, "/srv", &strings(&["a", "b"]));
        assert_eq!(
            vfsx::wire::encode(&descriptor).to_string(),
            "rename:/srv:a,b"
        );

        let descriptor = describe(OpKind::Connect, "/srv", &[]);
        assert_eq!(vfsx::wire::encode(&descriptor).to_string(), "connect:/srv");
    }

    #[test]
    fn test_argument_helpers() {
        let args = strings(&["x", "0755"]);
        assert_eq!(required(&args, 0, "path").unwrap(), "x");
        assert!(required(&args, 2, "data").is_err());
        assert_eq!(arg(&args, 5, "fallback"), "fallback");
        assert_eq!(octal("0755").unwrap(), 0o755);
        assert_eq!(octal("0o700").unwrap(), 0o700);
        assert!(octal("9").is_err());
        assert_eq!(number::<u64>("42").unwrap(), 42);
        assert!(number::<i32>("x").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["vfsx", "check", "unlink", "/srv", "a.txt"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Check { operation: OpKind::Unlink, .. }
        ));

        let cli = Cli::try_parse_from([
            "vfsx", "--socket", "/run/x.sock", "exec", "--root", ".", "--mode", "audit", "mkdir",
            "d",
        ])
        .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/run/x.sock")));
        assert!(matches!(
            cli.command,
            Command::Exec { mode: Some(Mode::Audit), operation: OpKind::Mkdir, .. }
        ));

        assert!(Cli::try_parse_from(["vfsx", "check", "chmod", "/srv"]).is_err());
    }

    #[test]
    fn test_exec_against_missing_decider() {
        let scratch = tempfile::tempdir().unwrap();
        let dir = scratch.path().canonicalize().unwrap();
        let config = BridgeConfig {
            socket_path: dir.join("none.sock"),
            mode: Mode::Gate,
            diagnostic_log: Some(dir.join("vfsx.log")),
        };

        exec(&config, dir.clone(), OpKind::Mkdir, &strings(&["sub"])).unwrap();
        assert!(dir.join("sub").is_dir());
        exec(&config, dir.clone(), OpKind::Write, &strings(&["sub/a", "hi"])).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join("sub/a")).unwrap(), "hi");
        assert!(exec(&config, dir.clone(), OpKind::Unlink, &[]).is_err());

        let log = std::fs::read_to_string(dir.join("vfsx.log")).unwrap();
        assert!(log.lines().next().unwrap().starts_with("connect:"));
        assert!(log.contains(":sub,493\n"));
    }
}
