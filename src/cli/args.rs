//! CLI argument definitions using clap

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigLayer, Field, OutputMode};

/// Upper bound for `--timeout` and `--interval`, one day.
pub const MAX_WAIT_SECS: u64 = 86_400;

/// Manage databases, branches, backups and data imports on the platform
#[derive(Parser, Debug)]
#[command(name = "psdb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command. They form the highest-precedence config layer.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Organization to operate in
    #[arg(long, global = true, value_name = "ORG")]
    pub org: Option<String>,

    /// Database to operate on
    #[arg(long, global = true, value_name = "DATABASE")]
    pub database: Option<String>,

    /// Branch to operate on
    #[arg(long, global = true, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, value_name = "FORMAT")]
    pub output: Option<OutputMode>,
}

impl GlobalArgs {
    pub fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            org: self.org.clone(),
            database: self.database.clone(),
            branch: self.branch.clone(),
            output: self.output,
            ..Default::default()
        }
        .normalized()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, list, show and delete branch backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Create, list, show, delete and switch branches
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },

    /// List and show databases
    #[command(visible_alias = "db")]
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },

    /// Inspect and promote external database imports
    DataImports {
        #[command(subcommand)]
        command: DataImportCommands,
    },

    /// Show or switch the current organization
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// Settings the invoked leaf cannot run without.
    pub fn requirements(&self) -> &'static [Field] {
        const ORG: &[Field] = &[Field::Organization];
        const ORG_DATABASE: &[Field] = &[Field::Organization, Field::Database];
        match self {
            Commands::Backup { .. } | Commands::Database { .. } | Commands::DataImports { .. } => {
                ORG
            }
            Commands::Branch {
                command: BranchCommands::Switch { .. },
            } => ORG_DATABASE,
            Commands::Branch { .. } => ORG,
            Commands::Org {
                command: OrgCommands::Show,
            } => ORG,
            Commands::Org { .. } | Commands::Config { .. } | Commands::Completion { .. } => &[],
        }
    }

    /// True for commands that talk to the platform.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Commands::Backup { .. }
                | Commands::Branch { .. }
                | Commands::Database { .. }
                | Commands::DataImports { .. }
        )
    }
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Back up a branch
    #[command(visible_alias = "b")]
    Create {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
        /// Backup name (generated by the platform when omitted)
        #[arg(long)]
        name: Option<String>,
        /// Wait until the backup has finished
        #[arg(long)]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(
            long,
            default_value_t = 600,
            value_name = "SECONDS",
            requires = "wait",
            value_parser = clap::value_parser!(u64).range(1..=MAX_WAIT_SECS)
        )]
        timeout: u64,
        /// Seconds between status checks while waiting
        #[arg(
            long,
            default_value_t = 2,
            value_name = "SECONDS",
            requires = "wait",
            value_parser = clap::value_parser!(u64).range(1..=MAX_WAIT_SECS)
        )]
        interval: u64,
    },

    /// List backups of a branch
    #[command(visible_alias = "ls")]
    List {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
    },

    /// Show a backup
    Show {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
        /// Backup id
        id: String,
    },

    /// Delete a backup
    Delete {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
        /// Backup id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BranchCommands {
    /// Create a branch
    Create {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
        /// Parent branch
        #[arg(long, default_value = "main")]
        from: String,
    },

    /// List branches of a database
    #[command(visible_alias = "ls")]
    List {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
    },

    /// Show a branch
    Show {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
    },

    /// Delete a branch
    Delete {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
    },

    /// Make a branch the project default, optionally creating it
    Switch {
        /// Branch name
        #[arg(id = "branch_name", value_name = "BRANCH")]
        branch: String,
        /// Create the branch if it does not exist
        #[arg(long)]
        create: bool,
        /// Parent branch used with --create
        #[arg(long, default_value = "main")]
        parent_branch: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DatabaseCommands {
    /// List databases in the organization
    #[command(visible_alias = "ls")]
    List,

    /// Show a database
    Show {
        /// Database name
        #[arg(id = "database_name", value_name = "DATABASE")]
        database: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DataImportCommands {
    /// Promote the imported database to primary
    #[command(visible_alias = "s")]
    MakePrimary {
        /// Database name
        #[arg(long)]
        name: String,
    },

    /// Show the import state of a database
    Show {
        /// Database name
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum OrgCommands {
    /// Show the effective organization
    Show,

    /// Set the organization in the global config file
    Switch {
        /// Organization name
        #[arg(id = "org_name", value_name = "ORG")]
        org: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration (access token redacted)
    Show,

    /// Show config file locations
    Path,

    /// Create a template config file
    Init {
        /// Create the global config instead of a project config
        #[arg(short, long)]
        global: bool,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
