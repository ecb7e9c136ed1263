//! Command-line interface for querying federated geofed stores.
//!
//! The `query` subcommand provisions the stores described by a JSON
//! configuration file, runs one federated bounding-box query, and prints
//! the result as a GeoJSON `FeatureCollection`. The `key` subcommands
//! convert composite feature keys to and from their wire form.
#![forbid(unsafe_code)]
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod error;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use geofed_core::geojson::feature_to_json;
use geofed_core::{KeyTuple, QueryFilter, SpatialPredicate, StoreConfig};
use geofed_sync::Engine;

pub use error::CliError;

/// Run the geofed CLI with the current process arguments.
///
/// # Errors
/// Returns [`CliError`] for argument, configuration, or query failures.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Query(args) => run_query(args),
        Command::Key(args) => run_key(&args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "geofed",
    about = "Federated queries over heterogeneous geospatial stores",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provision the configured stores and run one federated query.
    Query(QueryArgs),
    /// Encode or decode composite feature keys.
    Key(KeyArgs),
}

/// CLI arguments for the `query` subcommand.
#[derive(Debug, Parser)]
struct QueryArgs {
    /// Path to a JSON array of store configuration records.
    #[arg(long, value_name = "path")]
    stores: Utf8PathBuf,
    /// Bounding box as `min_x,min_y,max_x,max_y` (WGS84 lon/lat).
    #[arg(long, value_name = "bbox")]
    bbox: Option<String>,
    /// Restrict results to a layer; repeatable.
    #[arg(long = "layer", value_name = "layer")]
    layers: Vec<String>,
    /// Per-store result limit.
    #[arg(long, value_name = "count")]
    limit: Option<usize>,
}

#[derive(Debug, Parser)]
struct KeyArgs {
    #[command(subcommand)]
    command: KeyCommand,
}

#[derive(Debug, Subcommand)]
enum KeyCommand {
    /// Print the wire form of a store/layer/feature triple.
    Encode {
        store_id: String,
        layer_id: String,
        feature_id: String,
    },
    /// Decode a wire-form key into its components.
    Decode { key: String },
}

fn run_query(args: QueryArgs) -> Result<(), CliError> {
    let configs = load_store_configs(&args.stores)?;
    let filter = build_filter(&args)?;
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    runtime.block_on(async move {
        let engine = Engine::builder().with_stores(configs).build()?;
        engine.start().await;
        let mut results = engine.query(&filter);
        let mut features = Vec::new();
        while let Some(item) = results.next().await {
            match item {
                Ok(feature) => features.push(feature_to_json(&feature)),
                Err(error) => eprintln!("geofed: {error}"),
            }
        }
        engine.stop().await;
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": features,
        });
        let rendered =
            serde_json::to_string_pretty(&collection).map_err(CliError::SerializeOutput)?;
        println!("{rendered}");
        Ok(())
    })
}

fn run_key(args: &KeyArgs) -> Result<(), CliError> {
    match &args.command {
        KeyCommand::Encode {
            store_id,
            layer_id,
            feature_id,
        } => {
            println!("{}", KeyTuple::new(store_id, layer_id, feature_id).encode());
        }
        KeyCommand::Decode { key } => {
            let decoded = KeyTuple::decode(key)?;
            let rendered = serde_json::to_string_pretty(&serde_json::json!({
                "store_id": decoded.store_id,
                "layer_id": decoded.layer_id,
                "feature_id": decoded.feature_id,
            }))
            .map_err(CliError::SerializeOutput)?;
            println!("{rendered}");
        }
    }
    Ok(())
}

fn load_store_configs(path: &Utf8PathBuf) -> Result<Vec<StoreConfig>, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::ReadStores {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::ParseStores {
        path: path.clone(),
        source,
    })
}

fn build_filter(args: &QueryArgs) -> Result<QueryFilter, CliError> {
    let mut filter = QueryFilter::new();
    if let Some(bbox) = &args.bbox {
        filter = filter.with_predicate(SpatialPredicate::within(parse_bbox(bbox)?));
    }
    for layer in &args.layers {
        filter = filter.with_layer(layer);
    }
    if let Some(limit) = args.limit {
        filter = filter.with_limit(limit)?;
    }
    Ok(filter)
}

fn parse_bbox(value: &str) -> Result<[f64; 4], CliError> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| CliError::InvalidBbox {
            value: value.to_owned(),
        })?;
    <[f64; 4]>::try_from(parts).map_err(|_| CliError::InvalidBbox {
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("-10,-10,10,10", [-10.0, -10.0, 10.0, 10.0])]
    #[case("0.5, -0.5, 1.5, 2.5", [0.5, -0.5, 1.5, 2.5])]
    fn bbox_parses_four_numbers(#[case] value: &str, #[case] expected: [f64; 4]) {
        assert_eq!(parse_bbox(value).unwrap(), expected);
    }

    #[rstest]
    #[case("1,2,3")]
    #[case("1,2,3,4,5")]
    #[case("a,b,c,d")]
    #[case("")]
    fn malformed_bbox_is_rejected(#[case] value: &str) {
        assert!(matches!(
            parse_bbox(value),
            Err(CliError::InvalidBbox { .. })
        ));
    }

    #[rstest]
    fn filter_assembles_from_arguments() {
        let args = QueryArgs {
            stores: Utf8PathBuf::from("unused.json"),
            bbox: Some("-1,-1,1,1".to_owned()),
            layers: vec!["roads".to_owned()],
            limit: Some(5),
        };
        let filter = build_filter(&args).unwrap();
        assert!(filter.predicate().is_some());
        assert!(filter.layer_ids().contains("roads"));
        assert_eq!(filter.limit(), 5);
    }

    fn config_file(content: &str) -> (tempfile::NamedTempFile, Utf8PathBuf) {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).unwrap();
        (file, path)
    }

    #[rstest]
    fn store_configs_load_from_json() {
        let (_guard, path) = config_file(
            r#"[{"store_type": "geojson", "uri": "bundles/city.json", "name": "City", "id": "S1"}]"#,
        );
        let configs = load_store_configs(&path).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].id.as_deref(), Some("S1"));
    }

    #[rstest]
    fn malformed_store_configs_are_reported_with_the_path() {
        let (_guard, path) = config_file("not json");
        assert!(matches!(
            load_store_configs(&path),
            Err(CliError::ParseStores { path: reported, .. }) if reported == path
        ));
    }

    #[rstest]
    fn missing_store_config_file_is_reported() {
        let path = Utf8PathBuf::from("no/such/stores.json");
        assert!(matches!(
            load_store_configs(&path),
            Err(CliError::ReadStores { .. })
        ));
    }

    #[rstest]
    fn zero_limit_is_surfaced() {
        let args = QueryArgs {
            stores: Utf8PathBuf::from("unused.json"),
            bbox: None,
            layers: Vec::new(),
            limit: Some(0),
        };
        assert!(matches!(build_filter(&args), Err(CliError::Filter(_))));
    }
}
