use colored::Colorize;

fn suggest(lines: &[&str]) {
    eprintln!("\n{}", "Suggestion:".yellow().bold());
    for line in lines {
        eprintln!("  {line}");
    }
}

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("missing credential") {
        suggest(&["Export the API key named above, e.g.", "$ export OPENAI_API_KEY=<value>"]);
    } else if msg.contains("tierflow_http_url") || msg.contains("no http endpoint") {
        suggest(&[
            "Set the generic endpoint with:",
            "$ export TIERFLOW_HTTP_URL=http://localhost:8080/generate",
        ]);
    } else if msg.contains("unknown agent") || msg.contains("declares no") {
        suggest(&["Check the agents and steps sections of the workflow file."]);
    } else if msg.contains("database already open") || msg.contains("cannot acquire lock") {
        suggest(&["Another tierflow process is using this project; wait for it to finish."]);
    } else if msg.contains("connection refused") || msg.contains("timed out") {
        suggest(&["Check that the model service is running and reachable."]);
    }

    std::process::exit(1);
}
