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


use eyre::{Report, bail};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{error, info};

pub const LOCK_FILE: &str = ".dimsum-world.lock";

/// Exclusive claim on a world's data directory for as long as the daemon runs. The lock file
/// names the process and player holding it, so a second daemon can say who got there first.
pub struct WorldLock {
    _file: File,
}

impl WorldLock {
    pub fn acquire(data_dir: &Path, player: &str) -> Result<Self, Report> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            let holder = std::fs::read_to_string(&path).unwrap_or_default();
            let holder = match holder.trim() {
                "" => "an unknown process",
                holder => holder,
            };
            error!(?data_dir, holder, "world already open");
            bail!("{} is already open by {holder}: {e}", data_dir.display());
        }

        file.set_len(0)?;
        writeln!(file, "pid={} player={player}", std::process::id())?;
        file.sync_data()?;
        info!(?data_dir, player, "world locked");
        Ok(Self { _file: file })
    }
}
