//! Operator CLI over a certificate number database.
//!
//! # Responsibility
//! - Provide a smoke probe for `certnum_core` linkage (`certnum ping`).
//! - Expose issuance, listing, deletion and compaction for local checks.
//!
//! Set `CERTNUM_LOG_DIR` to an absolute directory to enable file logs.

use certnum_core::db::open_db;
use certnum_core::{
    default_log_level, init_logging, DisplayConfig, IssueListQuery, IssueService,
    SqliteArchiveRepository, SqliteIssueRepository,
};
use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "certnum")]
#[command(about = "Issue and number certificates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Database file shared by every data command.
#[derive(Args, Debug)]
struct DbArg {
    /// SQLite database file; created and migrated when missing
    #[arg(long, short = 'd')]
    db: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the core library is linked
    Ping,
    /// Create an issue, number it and archive it
    Issue {
        #[command(flatten)]
        target: DbArg,
        template_id: String,
        user_id: String,
        /// Expiry as epoch milliseconds
        #[arg(long)]
        expires_at: Option<i64>,
    },
    /// List issues in number order
    List {
        #[command(flatten)]
        target: DbArg,
        /// Only issues of this template
        template_id: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show one issue with its displayed number
    Show {
        #[command(flatten)]
        target: DbArg,
        issue_id: Uuid,
    },
    /// Delete an issue and compact the remaining numbers
    Delete {
        #[command(flatten)]
        target: DbArg,
        issue_id: Uuid,
    },
    /// Renumber live issues to 1..N
    Compact {
        #[command(flatten)]
        target: DbArg,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(log_dir) = std::env::var("CERTNUM_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    let number_mode = DisplayConfig::show_allocated_number();

    match command {
        Command::Ping => {
            println!("certnum_core ping={}", certnum_core::ping());
            println!("certnum_core version={}", certnum_core::core_version());
        }
        Command::Issue {
            target,
            template_id,
            user_id,
            expires_at,
        } => with_service(&target.db, |service| {
            let issued = service.issue(template_id, user_id, expires_at)?;
            let shown = service.display(issued.issue.id, &number_mode)?;
            println!("{} number={} code={}", issued.issue.id, shown, issued.issue.code);
            Ok(())
        })?,
        Command::List {
            target,
            template_id,
            limit,
            offset,
        } => with_service(&target.db, |service| {
            let query = IssueListQuery {
                template_id,
                limit,
                offset,
            };
            for issue in service.list_issues(&query)? {
                let number = issue
                    .number
                    .map_or_else(|| "-".to_string(), |value| value.to_string());
                println!(
                    "{number}\t{}\t{}\t{}\t{}",
                    issue.id, issue.template_id, issue.user_id, issue.code
                );
            }
            Ok(())
        })?,
        Command::Show { target, issue_id } => with_service(&target.db, |service| {
            let issue = service.get_issue(issue_id)?;
            let shown = service.display(issue_id, &number_mode)?;
            println!("{} number={} code={}", issue.id, shown, issue.code);
            Ok(())
        })?,
        Command::Delete { target, issue_id } => with_service(&target.db, |service| {
            let report = service.delete_issue(issue_id)?;
            println!("deleted; live={} renumbered={}", report.live, report.renumbered);
            Ok(())
        })?,
        Command::Compact { target } => with_service(&target.db, |service| {
            let report = service.compact()?;
            println!("live={} renumbered={}", report.live, report.renumbered);
            Ok(())
        })?,
    }

    Ok(())
}

type CliService<'conn> = IssueService<SqliteIssueRepository<'conn>, SqliteArchiveRepository<'conn>>;

fn with_service<F>(db: &Path, f: F) -> Result<(), Box<dyn Error>>
where
    F: FnOnce(&CliService<'_>) -> Result<(), Box<dyn Error>>,
{
    let conn = open_db(db)?;
    let service = IssueService::new(
        SqliteIssueRepository::try_new(&conn)?,
        SqliteArchiveRepository::try_new(&conn)?,
    );
    f(&service)
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;
    use std::path::Path;

    #[test]
    fn ping_takes_no_database() {
        let cli = Cli::try_parse_from(["certnum", "ping"]).unwrap();
        assert!(matches!(cli.command, Command::Ping));
        assert!(Cli::try_parse_from(["certnum", "ping", "list"]).is_err());
    }

    #[test]
    fn data_commands_require_db_and_parse_uuid() {
        let id = uuid::Uuid::new_v4();
        let id_arg = id.to_string();
        let cli =
            Cli::try_parse_from(["certnum", "show", "--db", "certs.db", id_arg.as_str()]).unwrap();
        match cli.command {
            Command::Show { target, issue_id } => {
                assert_eq!(target.db, Path::new("certs.db"));
                assert_eq!(issue_id, id);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["certnum", "compact"]).is_err());
        assert!(Cli::try_parse_from(["certnum", "delete", "-d", "certs.db", "not-a-uuid"]).is_err());
    }

    #[test]
    fn list_accepts_optional_template_and_paging() {
        let cli = Cli::try_parse_from([
            "certnum", "list", "-d", "certs.db", "template-1", "--limit", "5", "--offset", "10",
        ])
        .unwrap();
        match cli.command {
            Command::List {
                template_id,
                limit,
                offset,
                ..
            } => {
                assert_eq!(template_id.as_deref(), Some("template-1"));
                assert_eq!(limit, Some(5));
                assert_eq!(offset, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
