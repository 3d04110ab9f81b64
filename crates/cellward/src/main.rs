//! `cellward` — CLI front end for the permission, sandbox, DLP-tool
//! and audit substrate. Mostly an operator/debugging surface: the
//! substrate itself is consumed as a library by the host that embeds
//! it (spec §1 "out of scope: per-host UI surfaces").

use anyhow::{Context, Result};
use cellward::{CellwardConfig, Service};
use cellward_audit::HttpExporter;
use cellward_permission::evaluate;
use cellward_protocol::{CapabilityRequest, FsAccess, GrantUpdate, NetworkGrant, NetworkMode, Principal, PrincipalKind};
use cellward_sandbox::RunParams;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "cellward", about = "Permission, sandbox, DLP-tool and audit substrate")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Suppress non-error console output
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Path to config.toml (default: ~/.cellward/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn principal_kind(s: &str) -> std::result::Result<PrincipalKind, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| {
        format!("invalid principal type '{s}' (expected ai|connector|extension|script|user|system)")
    })
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Widen a principal's capability grant (monotonic merge, spec §4.1).
    Grant {
        #[arg(value_parser = principal_kind)]
        principal_type: PrincipalKind,
        principal_id: String,

        /// Directory to add to the filesystem.read scope (repeatable)
        #[arg(long = "fs-read")]
        fs_read: Vec<PathBuf>,

        /// Directory to add to the filesystem.readwrite scope (repeatable)
        #[arg(long = "fs-readwrite")]
        fs_readwrite: Vec<PathBuf>,

        /// Network mode to widen to: none|allowlist|full
        #[arg(long)]
        network: Option<String>,

        /// Host/origin to add to the network allowlist (repeatable)
        #[arg(long = "allow-host")]
        allow_host: Vec<String>,

        #[arg(long)]
        clipboard: bool,

        #[arg(long)]
        notifications: bool,

        #[arg(long)]
        automation: bool,
    },

    /// Evaluate a capability request against a principal's current grant.
    Check {
        #[arg(value_parser = principal_kind)]
        principal_type: PrincipalKind,
        principal_id: String,

        #[command(subcommand)]
        request: CheckRequest,
    },

    /// Run untrusted source in the sandbox supervisor.
    Run {
        #[arg(value_parser = principal_kind)]
        principal_type: PrincipalKind,
        principal_id: String,

        /// Path to the guest source file.
        source: PathBuf,

        #[arg(long, default_value = "python")]
        language: String,

        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,

        #[arg(long, default_value_t = 256)]
        memory_mb: u64,

        #[arg(long, default_value_t = 1_048_576)]
        max_output_bytes: u64,
    },

    /// Invoke one tool from the catalogue against an in-memory
    /// spreadsheet fixture (spec §4.4, §6.3).
    Tool {
        tool: String,

        /// JSON arguments for the tool call.
        #[arg(long, default_value = "{}")]
        args: String,

        /// Path to a `{sheet: [[value,...],...]}` JSON fixture.
        #[arg(long)]
        fixture: Option<PathBuf>,
    },

    #[command(subcommand)]
    Audit(AuditCommand),
}

#[derive(Subcommand, Debug)]
enum CheckRequest {
    Filesystem {
        path: PathBuf,
        #[arg(long, default_value = "read")]
        access: String,
    },
    Network {
        url: String,
    },
    Clipboard,
    Notifications,
    Automation,
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Print every queued (not-yet-acked) audit record as JSON.
    Tail,
    /// Clear the offline queue without exporting.
    Clear,
    /// Flush the offline queue to the configured SIEM endpoint.
    Flush,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = cellward_logging::init_logging(cellward_logging::LogConfig {
        app_name: "cellward",
        verbose: cli.verbose,
        quiet: cli.quiet,
    }) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(|| cellward_logging::cellward_home().join("config.toml"));
    let config = CellwardConfig::load(&config_path).context("loading config.toml")?;
    let service = Service::new(config)?;

    match cli.command {
        Commands::Grant { principal_type, principal_id, fs_read, fs_readwrite, network, allow_host, clipboard, notifications, automation } => {
            let principal = Principal::new(principal_type, principal_id);
            let mut update = GrantUpdate { filesystem_read: fs_read.into_iter().collect(), filesystem_readwrite: fs_readwrite.into_iter().collect(), ..GrantUpdate::default() };
            if network.is_some() || !allow_host.is_empty() {
                let mode = match network.as_deref() {
                    Some("full") => NetworkMode::Full,
                    Some("allowlist") => NetworkMode::Allowlist,
                    Some("none") | None => {
                        if allow_host.is_empty() {
                            NetworkMode::None
                        } else {
                            NetworkMode::Allowlist
                        }
                    }
                    Some(other) => anyhow::bail!("unknown network mode '{other}' (expected none|allowlist|full)"),
                };
                update.network = Some(NetworkGrant { mode, allowlist: allow_host.into_iter().collect::<BTreeSet<_>>() });
            }
            if clipboard {
                update.clipboard = Some(true);
            }
            if notifications {
                update.notifications = Some(true);
            }
            if automation {
                update.automation = Some(true);
            }
            let grant = service.permission.grant(&principal, &update);
            println!("{}", serde_json::to_string_pretty(&grant)?);
            Ok(())
        }

        Commands::Check { principal_type, principal_id, request } => {
            let principal = Principal::new(principal_type, principal_id);
            let capability = match request {
                CheckRequest::Filesystem { path, access } => CapabilityRequest::Filesystem {
                    access: if access == "readwrite" { FsAccess::ReadWrite } else { FsAccess::Read },
                    path,
                },
                CheckRequest::Network { url } => CapabilityRequest::Network { url },
                CheckRequest::Clipboard => CapabilityRequest::Clipboard,
                CheckRequest::Notifications => CapabilityRequest::Notifications,
                CheckRequest::Automation => CapabilityRequest::Automation,
            };
            let grant = service.permission.get_grant(&principal);
            let result = evaluate(&grant, &capability);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "allowed": result.allowed,
                "reason": result.reason,
            }))?);
            if result.allowed {
                Ok(())
            } else {
                anyhow::bail!("denied: {}", result.reason.unwrap_or_default())
            }
        }

        Commands::Run { principal_type, principal_id, source, language, timeout_ms, memory_mb, max_output_bytes } => {
            let principal = Principal::new(principal_type, principal_id);
            let source_text = std::fs::read_to_string(&source).with_context(|| format!("reading {}", source.display()))?;
            let language_flavor = match language.as_str() {
                "python" => cellward_protocol::GuestLanguage::Python,
                "js" | "javascript" => cellward_protocol::GuestLanguage::SpreadsheetJs,
                "transpiled" => cellward_protocol::GuestLanguage::TranspiledJs,
                other => anyhow::bail!("unknown --language '{other}' (expected python|js|transpiled)"),
            };
            let value = service
                .sandbox
                .run(RunParams {
                    principal,
                    language_flavor,
                    source: source_text,
                    timeout_ms,
                    memory_mb,
                    max_output_bytes,
                    label: "cli".to_string(),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }

        Commands::Tool { tool, args, fixture } => {
            let fixture_value = match fixture {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(&path)?)?,
                None => serde_json::json!({}),
            };
            let args_value: serde_json::Value = serde_json::from_str(&args).context("parsing --args as JSON")?;
            let executor = service.in_memory_tool_executor(&fixture_value);
            let result = executor.call(&tool, args_value).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Commands::Audit(AuditCommand::Tail) => {
            let records = service.audit.read_all()?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }

        Commands::Audit(AuditCommand::Clear) => {
            service.audit.clear()?;
            Ok(())
        }

        Commands::Audit(AuditCommand::Flush) => {
            let exporter_config = service.config().siem.as_exporter_config().ok_or_else(|| {
                anyhow::anyhow!("no [siem].endpoint configured in {}", config_path.display())
            })?;
            let exporter = HttpExporter::new(exporter_config);
            service.audit.flush_to_exporter(&exporter).await?;
            Ok(())
        }
    }
}
