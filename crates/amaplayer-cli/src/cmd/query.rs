use crate::output::print_json;
use amaplayer_core::config::PipelineConfig;
use amaplayer_core::search::{build_query, range_fields, SearchFilters};
use amaplayer_core::types::{Role, SortOrder};
use anyhow::Context;
use clap::Args;
use std::path::Path;

#[derive(Args)]
pub struct QueryArgs {
    /// Name prefix to search for
    #[arg(long)]
    text: Option<String>,
    /// athlete, coach, organization or parent
    #[arg(long)]
    role: Option<Role>,
    /// Sport filter; repeat or comma-separate for several
    #[arg(long = "sport", value_delimiter = ',')]
    sports: Vec<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    verified: Option<bool>,
    #[arg(long)]
    min_age: Option<u32>,
    #[arg(long)]
    max_age: Option<u32>,
    /// name, newest or followers
    #[arg(long)]
    sort: Option<SortOrder>,
    #[arg(long)]
    limit: Option<u32>,
    /// Collection to query
    #[arg(long, default_value = "users")]
    collection: String,
}

impl QueryArgs {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            text: self.text.clone(),
            role: self.role,
            sports: self.sports.clone(),
            location: self.location.clone(),
            verified: self.verified,
            min_age: self.min_age,
            max_age: self.max_age,
            sort: self.sort,
            limit: self.limit,
        }
    }
}

pub fn run(root: &Path, args: QueryArgs, json: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root).context("failed to load config")?;
    let query = build_query(&args.collection, &args.filters(), &config.search)
        .context("cannot build search query")?;

    if json {
        return print_json(&query);
    }

    println!("collection: {}", query.collection);
    for c in &query.constraints {
        println!("  {c}");
    }
    if let Some(field) = range_fields(&query).first() {
        println!("range field: {field}");
    }
    Ok(())
}
