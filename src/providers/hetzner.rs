//! Hetzner Cloud v1 adapter: snapshot images and server actions
//!
//! Hetzner snapshots are images of `type=snapshot` whose human-readable
//! name lives in `description`; the adapter maps it onto [`Snapshot::name`].

use super::{
    decode_body, parse_timestamp, ActionHandle, ActionStatus, FlexibleId, Provider, ServerTarget, Snapshot,
    SnapshotProvider,
};
use crate::api::{ApiClient, ApiError};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

pub const API_BASE: &str = "https://api.hetzner.cloud/v1";

const PAGE_SIZE: usize = 50;
const MAX_PAGES: u32 = 200;

#[derive(Deserialize)]
struct ImagePage {
    images: Vec<Image>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Image {
    id: FlexibleId,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
    created: String,
    #[serde(default)]
    created_from: Option<CreatedFrom>,
}

#[derive(Deserialize)]
struct CreatedFrom {
    id: FlexibleId,
}

#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(default)]
    next_page: Option<u64>,
}

#[derive(Deserialize)]
struct CreateImageResponse {
    #[serde(default)]
    image: Option<ImageRef>,
    action: Action,
}

#[derive(Deserialize)]
struct ImageRef {
    id: FlexibleId,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

#[derive(Deserialize)]
struct Action {
    id: FlexibleId,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Extract `{"error": {"code": ..., "message": ...}}` error bodies
pub fn decode_error(body: &str) -> Option<String> {
    let parsed: ErrorEnvelope = serde_json::from_str(body).ok()?;
    Some(match parsed.error.code {
        Some(code) => format!("{}: {}", code, parsed.error.message),
        None => parsed.error.message,
    })
}

/// Adapter for one cloud server
pub struct HetznerProvider {
    client: ApiClient,
    server: ServerTarget,
}

impl HetznerProvider {
    pub fn new(client: ApiClient, server: ServerTarget) -> Self {
        Self {
            client: client.with_error_decoder(decode_error),
            server,
        }
    }

    fn belongs_to_server(&self, image: &Image) -> bool {
        if image.kind.as_deref().map_or(false, |k| k != "snapshot") {
            return false;
        }
        let by_origin = image
            .created_from
            .as_ref()
            .map(|origin| origin.id.to_string() == self.server.id)
            .unwrap_or(false);
        let by_name = image
            .description
            .as_deref()
            .map(|d| d.starts_with(&self.server.snapshot_prefix()))
            .unwrap_or(false);
        by_origin || by_name
    }
}

impl SnapshotProvider for HetznerProvider {
    fn provider(&self) -> Provider {
        Provider::Hetzner
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>, ApiError> {
        let mut snapshots = Vec::new();

        for page in 1..=MAX_PAGES {
            let body = self.client.get_json(
                "/images",
                &[
                    ("type", "snapshot".to_string()),
                    ("per_page", PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ],
            )?;
            let page_data: ImagePage = decode_body(body, "image list")?;
            let count = page_data.images.len();

            for image in page_data.images.iter().filter(|i| self.belongs_to_server(i)) {
                let name = image.description.clone().unwrap_or_default();
                match parse_timestamp(&image.created) {
                    Some(created_at) => snapshots.push(Snapshot {
                        id: image.id.to_string(),
                        name,
                        created_at,
                        provider: Provider::Hetzner,
                    }),
                    None => warn!("Ignoring image {} with invalid created '{}'", image.id, image.created),
                }
            }

            let next_page = page_data
                .meta
                .and_then(|m| m.pagination)
                .and_then(|p| p.next_page);
            debug!("Image page {}: {} item(s), next page: {:?}", page, count, next_page);

            if count < PAGE_SIZE || next_page.is_none() {
                break;
            }
        }

        info!("Found {} snapshot(s) for server {}", snapshots.len(), self.server.name);
        Ok(snapshots)
    }

    fn create_snapshot(&self, name: &str) -> Result<ActionHandle, ApiError> {
        let body = self.client.post_json(
            &format!("/servers/{}/actions/create_image", self.server.id),
            json!({ "type": "snapshot", "description": name }),
        )?;
        let response: CreateImageResponse = decode_body(body, "create_image")?;

        let image_id = response
            .image
            .map(|image| image.id.to_string())
            .ok_or_else(|| ApiError::decode("create_image response has no image id"))?;

        info!(
            "Snapshot image {} (action {}) started for server {}",
            image_id, response.action.id, self.server.name
        );
        Ok(ActionHandle {
            action_id: response.action.id.to_string(),
            provider: Provider::Hetzner,
            snapshot_id: Some(image_id),
        })
    }

    fn poll_action(&self, handle: &ActionHandle) -> Result<ActionStatus, ApiError> {
        let body = self
            .client
            .get_json(&format!("/actions/{}", handle.action_id), &[])?;
        let envelope: ActionEnvelope = decode_body(body, "action status")?;

        Ok(match envelope.action.status.as_deref() {
            Some("success") => ActionStatus::Done,
            Some("error") => ActionStatus::Errored,
            _ => ActionStatus::Pending,
        })
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), ApiError> {
        match self.client.delete(&format!("/images/{}", snapshot_id)) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Image {} already deleted", snapshot_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
