use crate::error::CliError;
use connectors::file::csv::sink::FileInfo;
use model::{cluster::Cluster, execution::view::ExecutionView};
use serde::Serialize;
use std::{
    io::{self, Write},
    path::Path,
};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_execution(view: &ExecutionView) {
    println!("Execution '{}':", view.execution_id);
    println!("-----------------------------");
    println!("{:<16} {}", "Status", view.status);
    println!("{:<16} {}", "User", view.user_id);
    println!(
        "{:<16} {} total, {} completed, {} failed",
        "Targets", view.total_targets, view.completed_targets, view.failed_targets
    );
    println!("{:<16} {}", "Rows", view.total_rows);
    let duration = view
        .duration_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Duration", duration);
    if let Some(path) = &view.consolidated_path {
        println!("{:<16} {}", "Result file", path);
    }
    if let Some(message) = &view.error_message {
        println!("{:<16} {}", "Error", message);
    }

    if view.targets.is_empty() {
        return;
    }
    println!();
    println!("{:<20} {:<24} {:<10} {:>10}  {}", "CLUSTER", "DATABASE", "STATUS", "ROWS", "DETAIL");
    for target in &view.targets {
        let detail = target
            .error_message
            .as_deref()
            .or(target.file_path.as_deref())
            .unwrap_or("");
        println!(
            "{:<20} {:<24} {:<10} {:>10}  {}",
            target.cluster_alias, target.database, target.status, target.rows_affected, detail
        );
    }
}

pub fn print_executions(views: &[ExecutionView]) {
    if views.is_empty() {
        println!("No executions found");
        return;
    }
    println!("{:<38} {:<10} {:>8} {:>10}  {}", "ID", "STATUS", "TARGETS", "ROWS", "CREATED");
    for view in views {
        println!(
            "{:<38} {:<10} {:>8} {:>10}  {}",
            view.execution_id,
            view.status,
            view.total_targets,
            view.total_rows,
            view.created_at.to_rfc3339()
        );
    }
}

pub fn print_clusters(clusters: &[Cluster]) {
    println!("{:<6} {:<20} {:<30} {:<8} {}", "ID", "ALIAS", "ADDRESS", "ACTIVE", "DATABASES");
    for cluster in clusters {
        let databases: Vec<&str> = cluster.accessible_databases().map(|d| d.name.as_str()).collect();
        println!(
            "{:<6} {:<20} {:<30} {:<8} {}",
            cluster.id,
            cluster.alias,
            format!("{}:{}", cluster.host, cluster.port),
            cluster.active,
            databases.join(", ")
        );
    }
}

pub fn print_files(files: &[FileInfo]) {
    if files.is_empty() {
        println!("No result files");
        return;
    }
    println!("{:<60} {:>12} {:>10}  {}", "FILE", "BYTES", "ROWS", "MODIFIED");
    for file in files {
        println!(
            "{:<60} {:>12} {:>10}  {}",
            file.name,
            file.size,
            file.data_line_count,
            file.modified.to_rfc3339()
        );
    }
}

/// Writes `bytes` to `path`, or to stdout when no path is given.
pub async fn write_bytes(bytes: &[u8], path: Option<&Path>) -> Result<(), CliError> {
    match path {
        Some(path) => tokio::fs::write(path, bytes).await?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
