//! Typed wrappers over the backend's REST endpoints
//!
//! Payloads stay `serde_json::Value`; each dashboard interprets its own.

use super::{ApiClient, RequestOptions};
use crate::error::Result;
use reqwest::Method;
use serde_json::Value;
use std::fmt;

/// Sections selectable in the PDF report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportSection {
    Reservas,
    Ordenes,
    Comensales,
}

impl ReportSection {
    pub const ALL: [ReportSection; 3] = [
        ReportSection::Reservas,
        ReportSection::Ordenes,
        ReportSection::Comensales,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reservas" => Some(ReportSection::Reservas),
            "ordenes" => Some(ReportSection::Ordenes),
            "comensales" => Some(ReportSection::Comensales),
            _ => None,
        }
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportSection::Reservas => write!(f, "reservas"),
            ReportSection::Ordenes => write!(f, "ordenes"),
            ReportSection::Comensales => write!(f, "comensales"),
        }
    }
}

/// One method per backend endpoint
#[derive(Clone)]
pub struct KageApi {
    client: ApiClient,
}

impl KageApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn tables(&self) -> Result<Value> {
        self.client.get("/tables").await
    }

    pub async fn available_menu(&self) -> Result<Value> {
        self.client.get("/menu/available").await
    }

    pub async fn ingredients(&self) -> Result<Value> {
        self.client.get("/ingredients").await
    }

    pub async fn arrivals(&self) -> Result<Value> {
        self.client.get("/arrivals").await
    }

    pub async fn create_arrival(&self, arrival: &Value) -> Result<Value> {
        self.client.post("/arrivals", arrival).await
    }

    pub async fn orders_for_arrival(&self, arrival_id: i64) -> Result<Value> {
        self.client.get(&format!("/orders/{}", arrival_id)).await
    }

    pub async fn order_tracking(&self) -> Result<Value> {
        self.client.get("/orders/tracking").await
    }

    pub async fn create_order(&self, order: &Value) -> Result<Value> {
        self.client.post("/orders", order).await
    }

    pub async fn update_order_status(&self, order_id: i64, status: &str) -> Result<Value> {
        let options = RequestOptions::default().query("status", status);
        self.client
            .request(Method::PATCH, &format!("/orders/{}/status", order_id), options)
            .await
    }

    pub async fn users(&self) -> Result<Value> {
        self.client.get("/auth/users").await
    }

    pub async fn user(&self, user_id: i64) -> Result<Value> {
        self.client.get(&format!("/auth/users/{}", user_id)).await
    }

    pub async fn create_user(&self, user: &Value) -> Result<Value> {
        self.client.post("/auth/users", user).await
    }

    pub async fn update_user(&self, user_id: i64, updates: &Value) -> Result<Value> {
        self.client.patch(&format!("/auth/users/{}", user_id), updates).await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<Value> {
        self.client.delete(&format!("/auth/users/{}", user_id)).await
    }

    pub async fn dashboard_report(&self) -> Result<Value> {
        self.client.get("/reports/dashboard").await
    }

    /// Download the PDF report; `start`/`end` are ISO-8601 timestamps
    pub async fn pdf_report(&self, start: &str, end: &str, sections: &[ReportSection]) -> Result<Vec<u8>> {
        let options = RequestOptions::default()
            .query("start", start)
            .query("end", end)
            .query("sections", join_sections(sections));

        let response = self.client.send(Method::GET, "/reports/pdf", options).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn join_sections(sections: &[ReportSection]) -> String {
    sections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_section_parse() {
        assert_eq!(ReportSection::parse("Ordenes"), Some(ReportSection::Ordenes));
        assert_eq!(ReportSection::parse(" comensales "), Some(ReportSection::Comensales));
        assert_eq!(ReportSection::parse("ventas"), None);
    }

    #[test]
    fn test_join_sections() {
        assert_eq!(join_sections(&ReportSection::ALL), "reservas,ordenes,comensales");
        assert_eq!(join_sections(&[]), "");
    }
}
