//! parley-ctl — maintenance CLI for the SQLite user directory, a hand-rolled
//! dispatch over `Vec<&str>`.

use anyhow::{Context, Result};
use parley_core::config::ParleyConfig;
use parley_core::dh::DiffieParams;
use parley_core::hash::hash_hex;
use parley_services::UserDirectory;

/// Maintenance never does a Diffie–Hellman exchange, so these parameters
/// only exist to satisfy `UserDirectory::open`'s constructor — keep them
/// cheap rather than paying for a full 64-bit prime search on every `list`.
const CTL_DH_BITS: u64 = 16;
const CTL_DH_ROOT_SEARCH_BITS: u64 = 8;

fn print_usage() {
    println!("Usage: parley-ctl <command>");
    println!();
    println!("Users");
    println!("  users list                          List every registered user");
    println!("  users get <name>                    Show one user's stored password hash");
    println!("  users add <name> <password> [--force]  Register a user (or overwrite with --force)");
    println!();
    println!("Options:");
    println!("  --db <path>                         Override the users database path");
    println!();
    println!("Examples:");
    println!("  parley-ctl users list");
    println!("  parley-ctl users get alice");
    println!("  parley-ctl users add alice hunter2");
    println!("  parley-ctl users add alice hunter2 --force");
}

fn open_directory(db_path: Option<&str>) -> Result<UserDirectory> {
    let mut config = ParleyConfig::load().context("loading configuration")?;
    if let Some(path) = db_path {
        config.storage.users_db_path = path.into();
    }
    let diffie_params =
        DiffieParams::generate(CTL_DH_BITS, CTL_DH_ROOT_SEARCH_BITS, config.crypto.miller_rabin_rounds);
    UserDirectory::open(&config.storage.users_db_path, diffie_params)
        .with_context(|| format!("opening {}", config.storage.users_db_path.display()))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut db_path = None;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--db" {
            i += 1;
            db_path = Some(args.get(i).context("--db requires a value")?.clone());
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }

    let remaining_refs: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();

    match remaining_refs.as_slice() {
        ["users", "list"] => {
            let dir = open_directory(db_path.as_deref())?;
            for user in dir.list_users()? {
                println!("{}\t{}", user.username, user.password_hash);
            }
            Ok(())
        }
        ["users", "get", name] => {
            let dir = open_directory(db_path.as_deref())?;
            match dir.find_user(name)? {
                Some(user) => println!("{}\t{}", user.username, user.password_hash),
                None => {
                    eprintln!("user does not exist: {name}");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        ["users", "add", name, password] => {
            let dir = open_directory(db_path.as_deref())?;
            let hash = hash_hex(password.as_bytes());
            dir.add_user(name, &hash, false).context("adding user")?;
            println!("added {name}");
            Ok(())
        }
        ["users", "add", name, password, "--force"] => {
            let dir = open_directory(db_path.as_deref())?;
            let hash = hash_hex(password.as_bytes());
            dir.add_user(name, &hash, true).context("adding user")?;
            println!("added {name} (forced)");
            Ok(())
        }
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
