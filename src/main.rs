//! CodysTools - command-line front end.
//!
//! Usage: codys <COMMAND> [ARGS]
//!
//! Commands:
//!   list                      List installed mods
//!   install <source>          Install from owner/repo[#branch] or a GitHub URL
//!   update <id>               Re-fetch a mod from its source
//!   update-all                Update every mod with a pending update
//!   delete <id>               Delete a non-default mod
//!   enable <id>               Enable a mod
//!   disable <id>              Disable a mod
//!   check                     Check every sourced mod for updates
//!   merge-defaults            Merge the built-in default mods
//!   plan <url>                Show the mods that would be injected into a URL
//!   export <file>             Write a registry backup
//!   import <file>             Replace the registry with a backup
//!   stats                     Show registry statistics
//!   settings <id> [key [json]] Show or change a mod setting
//!
//! Options:
//!   --version, -v    Show version

use std::env;
use std::fs;
use std::sync::Arc;

use codystools::config::Config;
use codystools::logging;
use codystools::mods::{BackupDocument, JsonFileStore, Mod, ModService, ReqwestTransport};
use codystools::VERSION;

const USAGE: &str = "Usage: codys <list|install|update|update-all|delete|enable|disable|check|merge-defaults|plan|export|import|stats|settings> [ARGS]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("codys v{}", VERSION);
        return Ok(());
    }

    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load()?;
    let _log_guard = logging::init(&config.log_config)?;

    let store = Arc::new(JsonFileStore::new(config.store_path.clone()));
    let transport = Arc::new(ReqwestTransport::new(config.fetch_timeout()));
    let service = ModService::new(store, transport, config.service_options())?;
    service.merge_defaults()?;

    if let Err(e) = run(&service, command, &args[1..]) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(service: &ModService, command: &str, rest: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let arg = |index: usize, name: &str| -> Result<String, String> {
        rest.get(index)
            .cloned()
            .ok_or_else(|| format!("missing <{}>\n{}", name, USAGE))
    };

    match command {
        "list" => {
            for record in service.list() {
                print_mod(&record);
            }
        }
        "install" => {
            let record = service.install_from(&arg(0, "source")?)?;
            println!("Installed {} v{}", record.id, record.version);
        }
        "update" => {
            let outcome = service.update(&arg(0, "id")?)?;
            println!("Updated {} to v{}", outcome.record.id, outcome.record.version);
        }
        "update-all" => {
            let batch = service.update_all();
            for record in &batch.updated {
                println!("Updated {} to v{}", record.id, record.version);
            }
            for failed in &batch.failed {
                eprintln!("Failed {}: {} ({})", failed.id, failed.message, failed.kind);
            }
            if batch.updated.is_empty() && batch.failed.is_empty() {
                println!("No pending updates.");
            }
        }
        "delete" => {
            let record = service.delete(&arg(0, "id")?)?;
            println!("Deleted {}", record.id);
        }
        "enable" | "disable" => {
            let record = service.toggle(&arg(0, "id")?, command == "enable")?;
            println!("{} is now {}", record.id, if record.enabled { "enabled" } else { "disabled" });
        }
        "check" => {
            let updates = service.check_all_updates()?;
            match service.notification(&updates) {
                Some(notification) => {
                    println!("{}: {}", notification.title, notification.message);
                    for update in &updates {
                        println!("  {} {} -> {}", update.id, update.current_version, update.new_version);
                    }
                }
                None => println!("All mods are up to date."),
            }
        }
        "merge-defaults" => {
            let report = service.merge_defaults()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "plan" => {
            let url = arg(0, "url")?;
            for record in service.plan(&url) {
                println!("{}", record.id);
            }
        }
        "export" => {
            let path = arg(0, "file")?;
            fs::write(&path, service.export_backup().to_json()?)?;
            println!("Exported {} mods to {}", service.list().len(), path);
        }
        "import" => {
            let text = fs::read_to_string(arg(0, "file")?)?;
            let report = service.import_backup(BackupDocument::parse(&text)?)?;
            println!("Imported {} mods", report.imported);
        }
        "stats" => {
            println!("{}", serde_json::to_string_pretty(&service.stats()?)?);
        }
        "settings" => {
            let id = arg(0, "id")?;
            match (rest.get(1), rest.get(2)) {
                (Some(key), Some(raw)) => {
                    let value = serde_json::from_str(raw)
                        .unwrap_or_else(|_| serde_json::Value::String(raw.clone()));
                    service.set_mod_setting(&id, key, value)?;
                }
                (Some(key), None) => match service.get_mod_setting(&id, key)? {
                    Some(value) => println!("{}", value),
                    None => println!("(unset)"),
                },
                _ => println!(
                    "{}",
                    serde_json::to_string_pretty(&service.mod_settings(&id)?)?
                ),
            }
        }
        other => {
            return Err(format!("unknown command '{}'\n{}", other, USAGE).into());
        }
    }

    Ok(())
}

fn print_mod(record: &Mod) {
    let mut flags = Vec::new();
    if record.enabled {
        flags.push("enabled".to_string());
    }
    if record.is_default {
        flags.push("default".to_string());
    }
    if let Some(version) = &record.update_available {
        flags.push(format!("update {}", version));
    }

    println!(
        "{:<32} v{:<10} {} [{}]",
        record.id,
        record.version,
        record.name,
        flags.join(", ")
    );
}
