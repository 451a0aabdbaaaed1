// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolves a config file location: the env-var override when set, the
/// given default otherwise. Relative paths resolve against the working
/// directory; the file must exist.
pub fn resolve_config_path(env_var: &str, default: &str) -> Result<PathBuf> {
    let rel = std::env::var(env_var).unwrap_or_else(|_| default.to_string());
    let p = Path::new(&rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    abs.canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))
}
