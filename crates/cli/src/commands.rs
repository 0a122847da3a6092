use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a SELECT statement and wait for it to finish
    Submit {
        #[arg(
            long,
            help = "SQL statement; must start with SELECT and must not contain drop, delete, insert, update, truncate, alter or create anywhere, identifiers included"
        )]
        sql: String,

        #[arg(long, value_delimiter = ',', required = true, help = "Target cluster ids")]
        clusters: Vec<u64>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Only run against these databases (exact names)"
        )]
        databases: Option<Vec<String>>,

        #[arg(long, help = "Submitting user id")]
        user: String,

        #[arg(long, help = "Submitting user's email")]
        email: Option<String>,

        #[arg(long, help = "Free-form description stored with the execution")]
        description: Option<String>,

        #[arg(long, help = "Print the result as JSON instead of a table")]
        json: bool,
    },
    /// Show one execution with its targets
    Status {
        #[arg(help = "Execution id (exec_...)")]
        id: String,

        #[arg(long)]
        json: bool,
    },
    /// List executions by user or by state
    List {
        #[arg(long, conflicts_with_all = ["running", "pending"])]
        user: Option<String>,

        #[arg(long, conflicts_with = "pending")]
        running: bool,

        #[arg(long)]
        pending: bool,

        #[arg(long)]
        json: bool,
    },
    /// Cancel a pending or running execution
    Cancel {
        #[arg(help = "Execution id (exec_...)")]
        id: String,
    },
    /// Write the consolidated result file of an execution
    Download {
        #[arg(help = "Execution id (exec_...)")]
        id: String,

        #[arg(
            long,
            help = "If specified, writes the CSV to this file instead of stdout"
        )]
        output: Option<PathBuf>,
    },
    /// List the result files of an execution
    Files {
        #[arg(help = "Execution id (exec_...)")]
        id: String,

        #[arg(long)]
        json: bool,
    },
    /// Delete result directories older than the retention window
    Purge {
        #[arg(long, help = "Retention in days; defaults to FANOUT_RETENTION_DAYS")]
        days: Option<u32>,
    },
    /// Show the cluster inventory
    Clusters {
        #[arg(long)]
        json: bool,
    },
    /// Re-run database discovery for a cluster
    Discover {
        #[arg(help = "Cluster id")]
        cluster: u64,
    },
    /// Check that a cluster accepts connections
    TestConn {
        #[arg(help = "Cluster id")]
        cluster: u64,

        #[arg(long, help = "Database to connect to; defaults to the first known one")]
        database: Option<String>,
    },
}
