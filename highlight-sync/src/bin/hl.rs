// hl: CLI for the highlight-sync background daemon
//
// Commands:
//   hl status
//   hl sync
//   hl config [--api-url <url>] [--token <t> | --clear-token] [--project <id> | --clear-project] [--enable | --disable]
//   hl save <text> --url <url> [--title <t>] [--note <n>] [--project <id>] [--no-screenshot]
//   hl auth [--provider <name>]
//   hl projects
//   hl ping

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use highlight_sync::{
    background::{
        config::ConfigPatch,
        protocol::{ExtensionRequest, ExtensionResponse},
    },
    host::{
        client::{resolve_daemon_path, SocketPort},
        config::HostConfig,
    },
    models::HighlightDraft,
    page::port::BackgroundPort,
};
use std::env;

fn print_help() {
    println!(
        r#"hl - CLI for the highlight-sync daemon

USAGE:
    hl <COMMAND> [OPTIONS]

COMMANDS:
    status              Show offline queue length and last sync
    sync                Deliver queued highlights now
    config              Show or change configuration
    save <text>         Save a highlight
    auth                Sign in and store the token
    projects            List projects available to the signed-in account
    ping                Check that the daemon is reachable
    help                Show this help message

OPTIONS:
    --api-url <url>     API base URL (config)
    --token <token>     Bearer token (config); --clear-token removes it
    --project <id>      Project id (config, save); --clear-project removes it
    --enable            Turn highlighting on (config); --disable turns it off
    --url <url>         Source page URL (save)
    --title <title>     Source page title (save)
    --note <note>       Note attached to the highlight (save)
    --no-screenshot     Skip the preview capture (save)
    --provider <name>   Sign-in provider (auth, defaults to google)
    --json              Output the raw response as JSON

EXAMPLES:
    hl config --api-url https://highlights.example.com --project p_42
    hl save "the quick brown fox" --url https://example.com/post --title "A Post"
    hl status --json
"#
    );
}

#[derive(Debug, Default)]
struct Options {
    positional: Vec<String>,
    json: bool,
    api_url: Option<String>,
    token: Option<Option<String>>,
    project: Option<Option<String>>,
    enabled: Option<bool>,
    url: Option<String>,
    title: Option<String>,
    note: Option<String>,
    provider: Option<String>,
    no_screenshot: bool,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut opts = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let flag = arg.as_str();
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", flag))
        };
        match flag {
            "--json" => opts.json = true,
            "--api-url" => opts.api_url = Some(value()?),
            "--token" => opts.token = Some(Some(value()?)),
            "--clear-token" => opts.token = Some(None),
            "--project" | "-p" => opts.project = Some(Some(value()?)),
            "--clear-project" => opts.project = Some(None),
            "--enable" => opts.enabled = Some(true),
            "--disable" => opts.enabled = Some(false),
            "--url" => opts.url = Some(value()?),
            "--title" => opts.title = Some(value()?),
            "--note" => opts.note = Some(value()?),
            "--provider" => opts.provider = Some(value()?),
            "--no-screenshot" => opts.no_screenshot = true,
            _ if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            _ => opts.positional.push(arg.clone()),
        }
    }

    Ok(opts)
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{}…", visible)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let opts = parse_options(&args[2..])?;
    let config = HostConfig::from_env();
    let port = SocketPort::new(&config.socket_path).with_autostart(resolve_daemon_path());

    let request = match command {
        "status" => ExtensionRequest::GetQueueStatus,
        "sync" => ExtensionRequest::ProcessQueue,
        "projects" => ExtensionRequest::GetProjects,
        "ping" => ExtensionRequest::Ping,
        "auth" => ExtensionRequest::GoogleAuth {
            provider: opts.provider.clone().unwrap_or_else(|| "google".to_string()),
        },
        "config" => {
            let patch = ConfigPatch {
                api_url: opts.api_url.clone(),
                token: opts.token.clone(),
                project_id: opts.project.clone(),
                extension_enabled: opts.enabled,
            };
            if patch.is_empty() {
                ExtensionRequest::GetConfig
            } else {
                ExtensionRequest::SaveConfig { config: patch }
            }
        }
        "save" => {
            let text = opts.positional.join(" ");
            let source_url = opts
                .url
                .clone()
                .ok_or_else(|| anyhow!("Usage: hl save <text> --url <url>"))?;
            let project_id = match opts.project.clone().flatten() {
                Some(id) => id,
                None => configured_project(&port).await?,
            };
            ExtensionRequest::SaveHighlight {
                highlight: HighlightDraft {
                    text,
                    page_title: opts.title.clone().unwrap_or_else(|| source_url.clone()),
                    source_url,
                    note: opts.note.clone(),
                    timestamp: Utc::now(),
                    selection_rect: None,
                    project_id,
                },
                capture_screenshot: !opts.no_screenshot,
                tab_id: None,
            }
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    };

    let response = port.send(request).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if let Some(error) = response.error_message() {
        if !matches!(response, ExtensionResponse::SaveHighlight(ref r) if r.queued) {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    }

    print_response(&response);
    Ok(())
}

async fn configured_project(port: &SocketPort) -> Result<String> {
    match port.send(ExtensionRequest::GetConfig).await? {
        ExtensionResponse::GetConfig(resp) => resp
            .config
            .project_id()
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow!("No project configured. Use --project or `hl config --project <id>`.")
            }),
        other => bail!("Unexpected response: {:?}", other),
    }
}

fn print_response(response: &ExtensionResponse) {
    match response {
        ExtensionResponse::SaveHighlight(resp) => {
            if let Some(message) = &resp.message {
                println!("{}", message);
            }
            if let Some(id) = &resp.highlight_id {
                println!("  id: {}", id);
            }
        }
        ExtensionResponse::GetConfig(resp) => {
            let config = &resp.config;
            println!("API URL:   {}", config.api_url);
            println!(
                "Token:     {}",
                config.token().map(mask).unwrap_or_else(|| "(not signed in)".into())
            );
            println!("Project:   {}", config.project_id().unwrap_or("(none)"));
            println!(
                "Enabled:   {}",
                if config.extension_enabled { "yes" } else { "no" }
            );
        }
        ExtensionResponse::SaveConfig(_) => println!("Configuration saved"),
        ExtensionResponse::GetQueueStatus(resp) => {
            println!("Queued highlights: {}", resp.queue_length);
            if let Some(oldest) = resp.oldest_queued_at {
                println!("  oldest queued: {}", oldest.to_rfc3339());
            }
            match resp.last_sync_at {
                Some(at) => println!("  last sync:     {}", at.to_rfc3339()),
                None => println!("  last sync:     never"),
            }
        }
        ExtensionResponse::ProcessQueue(resp) => {
            println!("Sync finished, {} highlight(s) still queued", resp.queue_length);
        }
        ExtensionResponse::GoogleAuth(_) => println!("Signed in"),
        ExtensionResponse::GetProjects(resp) => {
            let projects = resp.projects.as_deref().unwrap_or_default();
            if projects.is_empty() {
                println!("No projects");
            }
            for project in projects {
                println!("{:<20} {}", project.id, project.name);
            }
        }
        ExtensionResponse::Ping { .. } => println!("pong"),
        ExtensionResponse::Error(resp) => {
            println!("{}", resp.error.as_deref().unwrap_or("Unknown error"));
        }
    }
}
