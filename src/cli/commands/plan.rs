//! Show the folder layout a fetch would produce.

use console::style;
use serde::Serialize;

use crate::config::Settings;
use crate::messaging::Notifier;
use crate::models::{CaseMetadata, CourtDocument, ProcessedCourtDocument};
use crate::scrapers::ReconcileStats;
use crate::services::download::process_documents;
use crate::services::enrich::{CancellationToken, EnrichResult, EnrichmentPass};

use super::open_page;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Plan {
    case: CaseMetadata,
    root_dir: String,
    stylesheet_url: Option<String>,
    stats: ReconcileStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    enrichment: Option<EnrichResult>,
    documents: Vec<ProcessedCourtDocument>,
}

pub async fn cmd_plan(
    settings: &Settings,
    source: &str,
    base_url: Option<&str>,
    probe: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (client, page) = open_page(settings, source, base_url).await?;
    let scraped = page.scrape(settings.date_separator, &settings.stylesheet_name)?;
    let mut documents = scraped.documents;

    let enrichment = if probe {
        let config = settings.enrich_config();
        let notifier = Notifier::disconnected();
        let result = EnrichmentPass::new(&client, &notifier, &config, CancellationToken::new())
            .run(&mut documents)
            .await?;
        Some(result)
    } else {
        None
    };

    let ordered: Vec<CourtDocument> = documents
        .grouped_ids()
        .iter()
        .filter_map(|id| documents.get(id).cloned())
        .collect();

    let plan = Plan {
        root_dir: scraped.metadata.root_dir(&settings.site_prefix),
        case: scraped.metadata,
        stylesheet_url: scraped.stylesheet_url,
        stats: scraped.stats,
        enrichment,
        documents: process_documents(ordered, settings.use_subdirectories),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "{} Case {} ({})",
        style("→").cyan(),
        style(&plan.case.case_number).bold(),
        plan.case.person_name
    );
    println!("  {}", settings.output_dir.join(&plan.root_dir).display());
    for doc in &plan.documents {
        println!("    {}", doc.relative_path());
    }

    println!(
        "{} {} documents from {} rows",
        style("✓").green(),
        plan.documents.len(),
        plan.stats.rows
    );
    if plan.stats.skipped() > 0 {
        println!(
            "  {} {} rows skipped (run with -v for details)",
            style("!").yellow(),
            plan.stats.skipped()
        );
    }
    if let Some(ref result) = plan.enrichment {
        for (id, reason) in &result.dropped {
            println!("  {} {} dropped: {:?}", style("✗").red(), id, reason);
        }
    } else {
        println!(
            "  {} Extensions are unknown until probed (--probe)",
            style("→").dim()
        );
    }

    Ok(())
}
