//! Settings assembly from command-line values and the overlay file

use crate::Cli;
use anyhow::{Context, Result};
use discovery_lib::Settings;

/// Build validated settings; command-line values win over the overlay file
pub fn build_settings(cli: &Cli) -> Result<Settings> {
    let settings = Settings {
        address: cli.address.clone(),
        cluster_name: cli.cluster_name.clone(),
        port: cli.port,
        protocol: cli.protocol.clone(),
        history: cli.history,
        timeout_secs: cli.timeout,
        collection: cli.collection,
        mode: cli.mode,
        ssl_verify: cli.ssl_verify.clone(),
        aggregator: cli.aggregator,
        interval: cli.interval,
        interval_size: cli.interval_size,
        debug: cli.debug,
        output_dir: cli.output_dir.clone(),
    };

    let settings = match &cli.file {
        Some(path) => settings.with_overlay_file(path)?,
        None => settings,
    };

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use discovery_lib::config::{Aggregator, RunMode};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_map_onto_settings() {
        let cli = Cli::parse_from([
            "discover",
            "--address",
            "prom.example",
            "--port",
            "9090",
            "--mode",
            "all",
            "--aggregator",
            "avg",
            "--intervalSize",
            "2",
        ]);

        let settings = build_settings(&cli).unwrap();
        assert_eq!(settings.base_url(), "http://prom.example:9090");
        assert_eq!(settings.mode, RunMode::All);
        assert_eq!(settings.aggregator, Aggregator::Avg);
        assert_eq!(settings.interval_size, 2);
    }

    #[test]
    fn test_overlay_file_fills_unset_options() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "prometheus_address from-file").unwrap();
        writeln!(file, "mode all").unwrap();
        writeln!(file, "aggregator min").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::parse_from(["discover", "--file", &path, "--aggregator", "avg"]);

        let settings = build_settings(&cli).unwrap();
        assert_eq!(settings.address, "from-file");
        assert_eq!(settings.mode, RunMode::All);
        // explicit flag beats the file
        assert_eq!(settings.aggregator, Aggregator::Avg);
    }

    #[test]
    fn test_cluster_name_flag_sets_export_cluster() {
        let cli = Cli::parse_from(["discover", "--address", "prom.example", "--clusterName", "prod-east"]);

        let settings = build_settings(&cli).unwrap();
        assert_eq!(settings.cluster(), "prod-east");
        assert_eq!(settings.base_url(), "http://prom.example");
    }

    #[test]
    fn test_missing_address_is_rejected() {
        let cli = Cli::parse_from(["discover"]);
        assert!(build_settings(&cli).is_err());
    }
}
