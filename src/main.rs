//! querydeck - run a query batch through the orchestrator and print its tabs.

mod cli;

use std::sync::{Arc, Mutex, PoisonError};

use cli::{Cli, OutputFormat};
use querydeck::logging::init_stderr_logging;
use querydeck::{
    CompletionCallback, Config, MockBackend, QueryDeckError, QueryOrchestrator, Result,
    TabsView,
};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse_args();
    init_stderr_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e.message());
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let format = cli.parse_output_format().map_err(QueryDeckError::config)?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| QueryDeckError::internal(format!("Failed to start runtime: {e}")))?;

    let (view, completions) = runtime.block_on(execute(cli, config))?;

    match format {
        OutputFormat::Text => print!("{}", render_text(&view, &completions)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&view)
                .map_err(|e| QueryDeckError::internal(format!("Failed to encode tabs: {e}")))?;
            println!("{json}");
        }
    }
    Ok(())
}

async fn execute(cli: &Cli, config: Config) -> Result<(TabsView, Vec<u64>)> {
    let settings = config.orchestrator;
    let poll_interval = settings.poll_interval();
    let orchestrator = QueryOrchestrator::new(Arc::new(MockBackend::new()), settings)?;

    let completions = Arc::new(Mutex::new(Vec::<u64>::new()));
    let recorder = Arc::clone(&completions);
    let on_complete: CompletionCallback = Arc::new(move |rows: u64| {
        recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rows);
    });

    orchestrator
        .execute_query(&cli.query, &cli.connection, Some(on_complete))
        .await?;

    while orchestrator.active_pollers() > 0 {
        tokio::time::sleep(poll_interval).await;
    }

    if let Some(page_index) = cli.page {
        let active = orchestrator.snapshot().active().map(|tab| tab.query_id);
        if let Some(query_id) = active {
            orchestrator.load_page(query_id, page_index).await;
        }
    }

    let view = orchestrator.snapshot();
    orchestrator.dispose();

    let completions = completions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    Ok((view, completions))
}

fn render_text(view: &TabsView, completions: &[u64]) -> String {
    let mut out = String::new();
    for tab in &view.tabs {
        let marker = if view.active_tab == Some(tab.id) { "*" } else { " " };
        out.push_str(&format!(
            "{marker}{} {} [{}]\n",
            tab.id,
            tab.name,
            tab.status
        ));
        if let Some(error) = &tab.error {
            out.push_str(&format!("  error: {error}\n"));
        } else if let Some(rows) = tab.affected_rows {
            out.push_str(&format!("  {rows} rows affected\n"));
        }
        if let Some(columns) = &tab.columns {
            out.push_str(&format!("  {}\n", columns.join(" | ")));
        }
        if let Some(page) = &tab.current_page_data {
            for row in page {
                let cells: Vec<String> = row.iter().map(render_cell).collect();
                out.push_str(&format!("  {}\n", cells.join(" | ")));
            }
            if let Some(total) = tab.total_pages {
                out.push_str(&format!(
                    "  page {} of {total}\n",
                    tab.current_page_index + 1
                ));
            }
        }
    }
    if !completions.is_empty() {
        let totals: Vec<String> = completions.iter().map(u64::to_string).collect();
        out.push_str(&format!("completed: {}\n", totals.join(", ")));
    }
    out
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}
