//! The interactive client shell: read a line, dispatch a verb, print the
//! outcome. All protocol work happens in [`backr::Client`].

use backr::{BackupOutcome, Client, Error, FileListOutcome, LoginStatus, RestoreOutcome};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(cs_host: String, cs_port: u16) -> backr::Result<()> {
    let mut client = Client::new(cs_host, cs_port);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };

        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        let done = match command {
            "exit" => return Ok(()),
            "login" => login(&mut client, &args).await,
            "logout" => {
                if client.logout() {
                    println!("Logged out");
                } else {
                    println!("You have to be logged in to logout");
                }
                Ok(())
            }
            "deluser" => deluser(&mut client).await,
            "backup" => backup(&client, &args).await,
            "restore" => restore(&client, &args).await,
            "dirlist" => dirlist(&client).await,
            "filelist" => filelist(&client, &args).await,
            "delete" => delete(&client, &args).await,
            _ => {
                println!("No such command: {command}");
                Ok(())
            }
        };

        if let Err(e) = done {
            println!("Could not complete {command} ({e})");
        }
    }
}

async fn login(client: &mut Client, args: &[&str]) -> backr::Result<()> {
    let &[user, pass] = args else {
        println!("Usage: login <user> <password>");
        return Ok(());
    };
    match client.login(user, pass).await {
        Ok(LoginStatus::New) => println!("Logged in with a new user"),
        Ok(LoginStatus::Ok) => println!("Logged in successfully"),
        Ok(LoginStatus::Rejected) => println!("Incorrect password"),
        Err(Error::Proto(_)) => println!("Invalid user/password pair"),
        Err(e) => return Err(e),
    }
    Ok(())
}

async fn deluser(client: &mut Client) -> backr::Result<()> {
    if client.deluser().await? {
        println!("User was deleted");
    } else {
        println!("User still has backed up directories");
    }
    Ok(())
}

async fn backup(client: &Client, args: &[&str]) -> backr::Result<()> {
    let &[dir] = args else {
        println!("Usage: backup <dir>");
        return Ok(());
    };
    match client.backup(Path::new(dir)).await? {
        BackupOutcome::NoServers => println!("No backup server can take the directory"),
        BackupOutcome::UpToDate => println!("All files are backed up already"),
        BackupOutcome::Uploaded(n) => println!("Backed up {n} file(s)"),
        BackupOutcome::Refused => println!("The backup server rejected the transfer"),
    }
    Ok(())
}

async fn restore(client: &Client, args: &[&str]) -> backr::Result<()> {
    let &[dir] = args else {
        println!("Usage: restore <dir>");
        return Ok(());
    };
    match client.restore(dir, Path::new(dir)).await? {
        RestoreOutcome::NotPlaced => println!("That directory was never backed up"),
        RestoreOutcome::MissingOnServer => println!("The backup server lost the directory"),
        RestoreOutcome::Restored(n) => println!("Restored {n} file(s) into {dir}"),
    }
    Ok(())
}

async fn dirlist(client: &Client) -> backr::Result<()> {
    let dirs = client.dirlist().await?;
    if dirs.is_empty() {
        println!("No directories are backed up yet");
    } else {
        println!("Backed up directories:");
        for dir in dirs {
            println!("  {dir}");
        }
    }
    Ok(())
}

async fn filelist(client: &Client, args: &[&str]) -> backr::Result<()> {
    let &[dir] = args else {
        println!("Usage: filelist <dir>");
        return Ok(());
    };
    match client.filelist(dir).await? {
        FileListOutcome::NotPlaced => println!("That directory was never backed up"),
        FileListOutcome::Files { host, port, files } => {
            println!("{} file(s) on {host}:{port}:", files.len());
            for file in files {
                println!("  {file}");
            }
        }
    }
    Ok(())
}

async fn delete(client: &Client, args: &[&str]) -> backr::Result<()> {
    let &[dir] = args else {
        println!("Usage: delete <dir>");
        return Ok(());
    };
    if client.delete(dir).await? {
        println!("Directory deleted");
    } else {
        println!("The directory could not be deleted");
    }
    Ok(())
}
