//! HTTP clients for the four backend services.
//!
//! Every call is bounded by the timeout of the shared [`reqwest::Client`].
//! A timeout, a transport error, a non-2xx status and an undecodable 2xx
//! body all come back as a [`SagaError`]: to the saga they are simply a
//! failure of the step that made the call.

use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SagaError;
use crate::services::catalog::{CatalogService, Product};
use crate::services::inventory::{InventoryService, ReservationReceipt};
use crate::services::payment::{PaymentReceipt, PaymentService};
use crate::services::purchase::{PurchaseReceipt, PurchaseService};

const TRANSACTION_PATH: &str = "transaccion";
const COMPENSATION_PATH: &str = "compensacion";
const LOOKUP_PATH: &str = "buscar";

/// Builds the client shared by all service adapters.
pub fn build_client(timeout: Duration) -> Result<Client, SagaError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SagaError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Base URL of one service plus the client used to reach it.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    service: &'static str,
    base_url: Url,
    client: Client,
}

impl ServiceEndpoint {
    /// Creates an endpoint; fails if `base_url` is not an absolute URL.
    pub fn new(service: &'static str, base_url: &str, client: Client) -> Result<Self, SagaError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            SagaError::Internal(format!("invalid {service} base URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SagaError::Internal(format!(
                "{service} base URL '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self {
            service,
            base_url,
            client,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get(&self, segments: &[&str]) -> Result<Response, SagaError> {
        let url = self.url(segments);
        tracing::debug!(service = self.service, %url, "GET");
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport(e))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Response, SagaError> {
        let url = self.url(segments);
        tracing::debug!(service = self.service, %url, "POST");
        self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport(e))
    }

    fn ensure_success(&self, response: Response) -> Result<Response, SagaError> {
        let status = response.status();
        if !status.is_success() {
            return Err(SagaError::ServiceRejected {
                service: self.service,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, SagaError> {
        response
            .json()
            .await
            .map_err(|e| SagaError::InvalidResponse {
                service: self.service,
                reason: e.to_string(),
            })
    }

    fn transport(&self, err: reqwest::Error) -> SagaError {
        let reason = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        SagaError::Transport {
            service: self.service,
            reason,
        }
    }
}

// -- Catalog --

/// Catalog lookups over HTTP: `GET {base}/buscar/{name}`.
#[derive(Debug, Clone)]
pub struct HttpCatalogService {
    endpoint: ServiceEndpoint,
}

impl HttpCatalogService {
    pub fn new(base_url: &str, client: Client) -> Result<Self, SagaError> {
        Ok(Self {
            endpoint: ServiceEndpoint::new("catalog", base_url, client)?,
        })
    }
}

#[async_trait]
impl CatalogService for HttpCatalogService {
    async fn find_product(&self, name: &str) -> Result<Product, SagaError> {
        let response = self.endpoint.get(&[LOOKUP_PATH, name]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SagaError::ProductNotFound(name.to_string()));
        }
        let response = self.endpoint.ensure_success(response)?;
        self.endpoint.decode(response).await
    }
}

// -- Purchases --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePurchaseRequest<'a> {
    user_id: &'a str,
    product_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelPurchaseRequest<'a> {
    purchase_id: &'a str,
}

/// Purchase records over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPurchaseService {
    endpoint: ServiceEndpoint,
}

impl HttpPurchaseService {
    pub fn new(base_url: &str, client: Client) -> Result<Self, SagaError> {
        Ok(Self {
            endpoint: ServiceEndpoint::new("purchases", base_url, client)?,
        })
    }
}

#[async_trait]
impl PurchaseService for HttpPurchaseService {
    async fn create(
        &self,
        user_id: &str,
        product_name: &str,
    ) -> Result<PurchaseReceipt, SagaError> {
        let request = CreatePurchaseRequest {
            user_id,
            product_name,
        };
        let response = self.endpoint.post(&[TRANSACTION_PATH], &request).await?;
        let response = self.endpoint.ensure_success(response)?;
        self.endpoint.decode(response).await
    }

    async fn cancel(&self, purchase_id: &str) -> Result<(), SagaError> {
        let request = CancelPurchaseRequest { purchase_id };
        let response = self.endpoint.post(&[COMPENSATION_PATH], &request).await?;
        self.endpoint.ensure_success(response).map(|_| ())
    }
}

// -- Payments --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeRequest<'a> {
    user_id: &'a str,
    amount: Money,
    purchase_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequest<'a> {
    payment_id: &'a str,
}

/// Payment processing over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPaymentService {
    endpoint: ServiceEndpoint,
}

impl HttpPaymentService {
    pub fn new(base_url: &str, client: Client) -> Result<Self, SagaError> {
        Ok(Self {
            endpoint: ServiceEndpoint::new("payments", base_url, client)?,
        })
    }
}

#[async_trait]
impl PaymentService for HttpPaymentService {
    async fn charge(
        &self,
        user_id: &str,
        amount: Money,
        purchase_id: &str,
    ) -> Result<PaymentReceipt, SagaError> {
        let request = ChargeRequest {
            user_id,
            amount,
            purchase_id,
        };
        let response = self.endpoint.post(&[TRANSACTION_PATH], &request).await?;
        let response = self.endpoint.ensure_success(response)?;
        self.endpoint.decode(response).await
    }

    async fn refund(&self, payment_id: &str) -> Result<(), SagaError> {
        let request = RefundRequest { payment_id };
        let response = self.endpoint.post(&[COMPENSATION_PATH], &request).await?;
        self.endpoint.ensure_success(response).map(|_| ())
    }
}

// -- Inventory --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReserveRequest<'a> {
    product_name: &'a str,
    quantity: u32,
}

/// Inventory reservations over HTTP.
#[derive(Debug, Clone)]
pub struct HttpInventoryService {
    endpoint: ServiceEndpoint,
}

impl HttpInventoryService {
    pub fn new(base_url: &str, client: Client) -> Result<Self, SagaError> {
        Ok(Self {
            endpoint: ServiceEndpoint::new("inventory", base_url, client)?,
        })
    }
}

#[async_trait]
impl InventoryService for HttpInventoryService {
    async fn reserve(
        &self,
        product_name: &str,
        quantity: u32,
    ) -> Result<ReservationReceipt, SagaError> {
        let request = ReserveRequest {
            product_name,
            quantity,
        };
        let response = self.endpoint.post(&[TRANSACTION_PATH], &request).await?;
        let response = self.endpoint.ensure_success(response)?;
        self.endpoint.decode(response).await
    }
}
