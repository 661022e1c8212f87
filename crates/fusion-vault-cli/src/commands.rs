use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use fusion_vault_core::{
    Config, CredentialVault, FileStore, LoadOutcome, ModuleStore, UploadOutcome, VaultState,
};
use tracing::{debug, warn};

use crate::password;

pub const USAGE: &str = "\
Usage: fusion-vault <command>

Credentials:
  status                         Show vault state
  list                           List credentials
  add <name> <token> [webhook]   Add a credential
  remove <id>                    Remove a credential
  activate <id>                  Make a credential the active one
  user <name>                    Set the display name
  set-password                   Protect the vault, or change its password
  token                          Print the active token
  export                         Print a credential backup
  import <file>                  Merge a credential backup

Modules:
  modules list
  modules add <title> <file>
  modules remove <id>
  modules export
  modules import <file>          Restore a backup, or store the file as a module
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    List,
    Add {
        name: String,
        token: String,
        webhook: Option<String>,
    },
    Remove(String),
    Activate(String),
    User(String),
    SetPassword,
    Token,
    Export,
    Import(PathBuf),
    Modules(ModuleCommand),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleCommand {
    List,
    Add { title: String, file: PathBuf },
    Remove(String),
    Export,
    Import(PathBuf),
}

/// Parse arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let command = match args.as_slice() {
        [] | ["help"] | ["--help"] | ["-h"] => Command::Help,
        ["status"] => Command::Status,
        ["list"] => Command::List,
        ["add", name, token] => Command::Add {
            name: name.to_string(),
            token: token.to_string(),
            webhook: None,
        },
        ["add", name, token, webhook] => Command::Add {
            name: name.to_string(),
            token: token.to_string(),
            webhook: Some(webhook.to_string()),
        },
        ["remove", id] => Command::Remove(id.to_string()),
        ["activate", id] => Command::Activate(id.to_string()),
        ["user", name] => Command::User(name.to_string()),
        ["set-password"] => Command::SetPassword,
        ["token"] => Command::Token,
        ["export"] => Command::Export,
        ["import", file] => Command::Import(PathBuf::from(file)),
        ["modules", rest @ ..] => Command::Modules(parse_module_args(rest)?),
        _ => bail!("Unrecognized command: {}\n\n{}", args.join(" "), USAGE),
    };
    Ok(command)
}

fn parse_module_args(args: &[&str]) -> Result<ModuleCommand> {
    let command = match args {
        [] | ["list"] => ModuleCommand::List,
        ["add", title, file] => ModuleCommand::Add {
            title: title.to_string(),
            file: PathBuf::from(file),
        },
        ["remove", id] => ModuleCommand::Remove(id.to_string()),
        ["export"] => ModuleCommand::Export,
        ["import", file] => ModuleCommand::Import(PathBuf::from(file)),
        _ => bail!("Unrecognized modules command: {}\n\n{}", args.join(" "), USAGE),
    };
    Ok(command)
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
    if command == Command::Help {
        print!("{}", USAGE);
        return Ok(());
    }

    let data_dir = config.data_dir()?;
    debug!(dir = %data_dir.display(), "Opening storage");
    let store = Arc::new(
        FileStore::new(data_dir.clone())
            .with_context(|| format!("Failed to open storage in {}", data_dir.display()))?,
    );

    if let Command::Modules(module_command) = command {
        let mut modules = ModuleStore::with_keys(Arc::clone(&store), &config.storage_keys);
        modules.load();
        return run_modules(module_command, &mut modules);
    }

    let mut vault = CredentialVault::with_config(Arc::clone(&store), config);
    if vault.load() == LoadOutcome::Corrupt {
        warn!("Stored vault could not be read; continuing with an empty vault");
    }

    match command {
        Command::Status => {
            print_status(&vault);
            return Ok(());
        }
        Command::SetPassword => {
            if vault.is_locked() {
                unlock(&mut vault).await?;
            }
            let new_password = password::new_password()?;
            vault.set_password(&new_password).await?;
            println!("Vault protected.");
            return Ok(());
        }
        _ => {}
    }

    if vault.is_locked() {
        unlock(&mut vault).await?;
    }

    match command {
        Command::List => {
            if vault.credentials().is_empty() {
                println!("No credentials stored.");
            }
            for credential in vault.credentials() {
                let marker = if credential.active { "*" } else { " " };
                println!(
                    "{} {:<16} {:<24} {}",
                    marker,
                    credential.id,
                    credential.name,
                    credential.kind_label()
                );
            }
        }
        Command::Add {
            name,
            token,
            webhook,
        } => {
            let id = vault
                .add_credential(&name, &token, webhook.as_deref())
                .await?;
            println!("Added {}", id);
        }
        Command::Remove(id) => vault.remove_credential(&id).await?,
        Command::Activate(id) => {
            vault.set_active(&id).await?;
            match vault.active_credential() {
                Some(active) if active.id == id => println!("Active: {}", active.name),
                _ => println!("No credential with id {}", id),
            }
        }
        Command::User(name) => vault.set_user(&name).await?,
        Command::Token => {
            let token = vault
                .get_active_token()
                .ok_or_else(|| anyhow!("No active key"))?;
            println!("{}", token);
        }
        Command::Export => println!("{}", vault.export_backup()?),
        Command::Import(file) => {
            let raw = read_file(&file)?;
            vault.import_backup_json(&raw).await?;
            println!("Imported. {} credentials stored.", vault.credentials().len());
        }
        Command::Status | Command::SetPassword | Command::Modules(_) | Command::Help => {}
    }
    Ok(())
}

async fn unlock(vault: &mut CredentialVault<Arc<FileStore>>) -> Result<()> {
    let password = password::unlock_password()?;
    vault
        .unlock(&password)
        .await
        .context("Incorrect password or damaged vault")
}

fn print_status(vault: &CredentialVault<Arc<FileStore>>) {
    println!("Vault: {}", vault.state());
    if vault.state() == VaultState::Locked {
        return;
    }
    println!("User: {}", vault.user());
    println!("Credentials: {}", vault.credentials().len());
    match vault.active_credential() {
        Some(active) => println!("Active: {}", active.name),
        None => println!("Active: --"),
    }
}

fn run_modules(command: ModuleCommand, modules: &mut ModuleStore<Arc<FileStore>>) -> Result<()> {
    match command {
        ModuleCommand::List => {
            if modules.modules().is_empty() {
                println!("No modules.");
            }
            for module in modules.modules() {
                println!("{:<16} {:<32} {}", module.id, module.title, module.date_display());
            }
        }
        ModuleCommand::Add { title, file } => {
            let content = read_file(&file)?;
            let id = modules.save_module(&title, &content)?;
            println!("Created {}", id);
        }
        ModuleCommand::Remove(id) => modules.delete_module(&id)?,
        ModuleCommand::Export => println!("{}", modules.export_backup()?),
        ModuleCommand::Import(file) => {
            let text = read_file(&file)?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            match modules.upload(&file_name, &text)? {
                UploadOutcome::Restored(count) => println!("Restored {} modules.", count),
                UploadOutcome::Stored(id) => println!("Stored as module {}", id),
            }
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
