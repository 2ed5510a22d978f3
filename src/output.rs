//! Terminal feedback for the CLI.

use crate::transfer::{ResponseDocument, TransferHandle};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let template = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(template);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn finish_spinner_success(spinner: &ProgressBar, msg: &str) {
    spinner.finish_with_message(format!("{} {}", style("✓").green().bold(), msg));
}

pub fn finish_spinner_warning(spinner: &ProgressBar, msg: &str) {
    spinner.finish_with_message(format!("{} {}", style("!").yellow().bold(), msg));
}

pub fn finish_spinner_error(spinner: &ProgressBar, msg: &str) {
    spinner.finish_with_message(format!("{} {}", style("✗").red().bold(), msg));
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), msg);
}

pub fn print_published(handle: &TransferHandle) {
    println!(
        "{} Published {}",
        style("✓").green().bold(),
        style(&handle.remote_name).bold()
    );
    println!("  uploaded: {}", handle.uploaded_path.display());
    println!("  sha256:   {}", style(&handle.sha256).dim());
}

pub fn print_response(doc: &ResponseDocument) {
    let marker = if doc.is_success() {
        style("✓").green().bold()
    } else {
        style("✗").red().bold()
    };
    println!("{} Response {}", marker, doc.path.display());
    println!(
        "  response: {}  message: {}",
        doc.response_code.as_deref().unwrap_or("-"),
        doc.message.as_deref().unwrap_or("-")
    );
    if let Some(id) = &doc.session_id {
        println!("  session:  {id}");
    }
    println!(
        "  batches:  {}  rfr responses: {}",
        doc.batch_responses, doc.rfr_responses
    );
}
