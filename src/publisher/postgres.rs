// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    db::Database,
    models::{device::Device, property::PropertyRecord},
    publisher::Sink,
};

/// Writes readings into the `Property` table and devices into `Device`.
pub struct PostgresSink {
    db: Arc<Database>,
}

impl PostgresSink {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Sink for PostgresSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn register_device(&self, device: &Device) -> Result<()> {
        self.db.register_device(device).await
    }

    async fn write(&self, records: &[PropertyRecord]) -> Result<()> {
        self.db.write_properties(records).await
    }
}
