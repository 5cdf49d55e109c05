// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//


use clap::builder::ValueHint;
use clap_derive::Parser;
use dimsum_kernel::config::{BehaviorConfig, Config, MaterializeConfig};
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format as ProviderFormat, Serialized, Yaml};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dimsum-daemon", about = "Run a dimsum world, one player at the console")]
pub struct Args {
    #[arg(
        value_name = "data-dir",
        help = "Directory to store all database files under",
        value_hint = ValueHint::DirPath,
        default_value = "./dimsum-data"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long,
        value_name = "db",
        help = "Entity database directory (relative to data-dir if not absolute)",
        value_hint = ValueHint::DirPath,
        default_value = "world.db"
    )]
    pub db: PathBuf,

    #[arg(
        long,
        value_name = "config",
        help = "Path to configuration (YAML) file to use, if any. If not specified, defaults are used.\
                Configuration file values can be overridden by command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        long,
        value_name = "player",
        help = "Name of the player commands are performed as, created on first use",
        default_value = "Jacob"
    )]
    pub player: String,

    #[command(flatten)]
    pub runtime_args: RuntimeArgs,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

#[derive(Parser, Debug, Default)]
pub struct RuntimeArgs {
    #[arg(
        long,
        value_name = "max-reach-depth",
        help = "Deepest level materialization follows references to"
    )]
    pub max_reach_depth: Option<u32>,

    #[arg(
        long,
        value_name = "max-call-logs",
        help = "How many call records each behavior keeps"
    )]
    pub max_call_logs: Option<usize>,

    #[arg(
        long,
        value_name = "max-operations",
        help = "Script operation budget per call, 0 for no limit"
    )]
    pub max_operations: Option<u64>,
}

impl RuntimeArgs {
    fn merge_config(&self, materialize: &mut MaterializeConfig, behavior: &mut BehaviorConfig) {
        if let Some(depth) = self.max_reach_depth {
            materialize.max_reach_depth = depth;
        }
        if let Some(logs) = self.max_call_logs {
            behavior.max_call_logs = logs;
        }
        if let Some(operations) = self.max_operations {
            behavior.max_operations = operations;
        }
    }
}

impl Args {
    /// Load the configuration file if we have it, then apply the command line on top.
    pub fn load_config(&self) -> Result<Config, eyre::Report> {
        let mut config = match &self.config_file {
            Some(config_path) => Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Yaml::file(config_path))
                .extract::<Config>()
                .map_err(|e| {
                    eyre!(
                        "Failed to parse configuration from {:?}: {}",
                        config_path,
                        e
                    )
                })?,
            None => Config::default(),
        };
        self.runtime_args
            .merge_config(&mut config.materialize, &mut config.behavior);
        Ok(config)
    }

    pub(crate) fn resolved_db_path(&self) -> PathBuf {
        if self.db.is_absolute() {
            self.db.clone()
        } else {
            self.data_dir.join(&self.db)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["dimsum-daemon"]).unwrap();
        assert_eq!(args.player, "Jacob");
        assert_eq!(args.resolved_db_path(), PathBuf::from("./dimsum-data/world.db"));
        let config = args.load_config().unwrap();
        assert_eq!(config.behavior.max_call_logs, 20);
    }

    #[test]
    fn test_file_then_arguments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "behavior:\n  max_call_logs: 5\n  max_operations: 1000\nmaterialize:\n  max_reach_depth: 4"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();
        let args = Args::try_parse_from([
            "dimsum-daemon",
            "/tmp/world",
            "--config-file",
            &path,
            "--max-call-logs",
            "7",
            "--db",
            "/var/dimsum/entities",
        ])
        .unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config.behavior.max_call_logs, 7);
        assert_eq!(config.behavior.max_operations, 1000);
        assert_eq!(config.materialize.max_reach_depth, 4);
        assert_eq!(args.resolved_db_path(), PathBuf::from("/var/dimsum/entities"));
    }
}
