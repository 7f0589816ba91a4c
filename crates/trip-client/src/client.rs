//! Dispatch backend HTTP client.
//!
//! Implements the engine's collaborator interfaces against a JSON backend.
//! The wire format lives entirely in this crate; the engine only sees the
//! trait-level types.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use trip_core::models::Point;
use trip_engine::oracle::{
    CostOracle, OracleError, PositionSource, RouteRequest, RoutingOracle, WaypointCompletionSink,
};

/// HTTP client for the dispatch backend.
pub struct DispatchClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct EstimateRouteRequest {
    origin: WirePoint,
    destination: WirePoint,
    stops: Vec<WirePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vehicle_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EstimateRouteResponse {
    polyline: Vec<WirePoint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePoint {
    lat: f64,
    lon: f64,
}

impl From<Point> for WirePoint {
    fn from(p: Point) -> Self {
        Self { lat: p.lat, lon: p.lon }
    }
}

impl From<WirePoint> for Point {
    fn from(p: WirePoint) -> Self {
        Point::new(p.lat, p.lon)
    }
}

#[derive(Debug, Deserialize)]
struct VehiclePositionResponse {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct DeclaredCostResponse {
    cost: f64,
}

impl DispatchClient {
    /// Create a new client. An empty token disables the auth header.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let token = token.into();
        let auth_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
            auth_token,
        }
    }

    /// Update auth token at runtime (refresh, rotation, etc.).
    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token.as_deref() {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

fn status_error(status: StatusCode) -> OracleError {
    if status == StatusCode::NOT_FOUND {
        OracleError::NotFound
    } else {
        OracleError::Http {
            status: status.as_u16(),
        }
    }
}

fn transport_error(err: reqwest::Error) -> OracleError {
    OracleError::Transport(err.to_string())
}

impl PositionSource for DispatchClient {
    async fn fetch_position(&self, vehicle_id: &str) -> Result<Option<Point>, OracleError> {
        let url = format!("{}/v1/vehicles/{}/position", self.base_url, vehicle_id);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            // Vehicle has no active fix right now; not a failure.
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let body: VehiclePositionResponse = response.json().await.map_err(transport_error)?;
        Ok(Some(Point::new(body.lat, body.lon)))
    }
}

impl RoutingOracle for DispatchClient {
    async fn estimate_route(&self, request: RouteRequest) -> Result<Vec<Point>, OracleError> {
        let url = format!("{}/v1/routes/estimate", self.base_url);
        let body = EstimateRouteRequest {
            origin: request.origin.into(),
            destination: request.destination.into(),
            stops: request.stops.into_iter().map(Into::into).collect(),
            vehicle_kind: request.vehicle_kind,
        };

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let body: EstimateRouteResponse = response.json().await.map_err(transport_error)?;
        tracing::debug!(vertices = body.polyline.len(), "route estimate received");
        Ok(body.polyline.into_iter().map(Into::into).collect())
    }
}

impl CostOracle for DispatchClient {
    async fn declared_cost(&self, trip_id: &str) -> Result<f64, OracleError> {
        let url = format!("{}/v1/trips/{}/cost", self.base_url, trip_id);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let body: DeclaredCostResponse = response.json().await.map_err(transport_error)?;
        Ok(body.cost)
    }
}

impl WaypointCompletionSink for DispatchClient {
    async fn report_completion(&self, trip_id: &str, order: u32) -> Result<(), OracleError> {
        let url = format!(
            "{}/v1/trips/{}/waypoints/{}/complete",
            self.base_url, trip_id, order
        );
        let response = self
            .authorize(self.client.post(&url))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }
        Ok(())
    }
}
