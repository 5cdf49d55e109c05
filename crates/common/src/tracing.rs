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

//! Logging setup shared by dimsum binaries.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Storage engine chatter is noise at either level.
const QUIET: &[&str] = &["fjall=warn", "lsm_tree=warn"];

/// The filter used when `RUST_LOG` is unset.
pub fn default_filter(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    std::iter::once(level)
        .chain(QUIET.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

/// Install a compact fmt subscriber. `RUST_LOG` wins when set; otherwise `debug_fallback` picks
/// between debug and info.
pub fn init_tracing(debug_fallback: bool) -> Result<(), eyre::Report> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::new(default_filter(debug_fallback)),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_ansi(true)
                .with_file(true)
                .with_target(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_span_events(fmt::format::FmtSpan::NONE),
        )
        .with(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("unable to initialize tracing: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter(false),
            "info,fjall=warn,lsm_tree=warn"
        );
        assert_eq!(default_filter(true), "debug,fjall=warn,lsm_tree=warn");
        assert!(EnvFilter::try_new(default_filter(false)).is_ok());
    }
}
