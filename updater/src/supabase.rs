//! Minimal PostgREST client for a Supabase project: `table(name).upsert(rows)?.execute()`.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::SupabaseConfig;

const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build supabase http client")?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            service_role_key: config.service_role_key.clone(),
        })
    }

    pub fn table(&self, name: &str) -> Table<'_> {
        Table {
            client: self,
            name: name.to_string(),
        }
    }
}

pub struct Table<'a> {
    client: &'a SupabaseClient,
    name: String,
}

impl<'a> Table<'a> {
    /// Prepares an insert-or-merge of `rows`; conflicts resolve on the table's primary key.
    pub fn upsert<T: Serialize>(self, rows: &[T]) -> Result<Upsert<'a>> {
        let body = serde_json::to_value(rows)
            .with_context(|| format!("failed to encode rows for {}", self.name))?;
        Ok(Upsert {
            client: self.client,
            table: self.name,
            rows: rows.len(),
            body,
        })
    }
}

pub struct Upsert<'a> {
    client: &'a SupabaseClient,
    table: String,
    rows: usize,
    body: serde_json::Value,
}

impl Upsert<'_> {
    pub async fn execute(self) -> Result<()> {
        let url = format!("{}/{}", self.client.rest_url, self.table);
        let key = self.client.service_role_key.as_str();
        let resp = self
            .client
            .client
            .post(url)
            .header("apikey", key)
            .bearer_auth(key)
            .header("Prefer", UPSERT_PREFERENCE)
            .json(&self.body)
            .send()
            .await
            .with_context(|| format!("supabase upsert into {} failed", self.table))?;

        let status = resp.status();
        if !status.is_success() {
            // 讀不到 body 時仍保留狀態碼，並把讀取錯誤帶進訊息
            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => format!("<body unreadable: {err}>"),
            };
            anyhow::bail!(
                "supabase upsert into {} returned status {}: {}",
                self.table,
                status,
                body
            );
        }
        debug!(table = %self.table, rows = self.rows, "supabase upsert ok");
        Ok(())
    }
}
