//! Canned provider responses
//!
//! Route fragments include the API host so DigitalOcean and Hetzner
//! servers can share one `MockTransport` in a batch test.

use crate::config_builder::TEST_BOT_TOKEN;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use snapshot_manager::api::transport::mock::MockTransport;
use snapshot_manager::api::{HttpResponse, Method};
use snapshot_manager::config::ServerConfig;

/// Creation time of the `index`th pre-existing snapshot (one per day, oldest first)
pub fn day(index: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap() + Duration::days(index as i64)
}

/// Telegram Bot API success reply
pub fn telegram_ok() -> HttpResponse {
    HttpResponse::json(200, &json!({"ok": true, "result": {"message_id": 1}}))
}

/// Route for the test bot's sendMessage endpoint
pub fn telegram_route() -> String {
    format!("api.telegram.org/bot{}/sendMessage", TEST_BOT_TOKEN)
}

/// Accept Telegram messages and webhook posts to `webhook_host`
pub fn notifications_ok(transport: MockTransport, webhook_host: &str) -> MockTransport {
    transport
        .on(Method::Post, &telegram_route(), telegram_ok())
        .on(Method::Post, webhook_host, HttpResponse::new(200, "ok"))
}

/// The notification payloads posted to `webhook_host`
pub fn webhook_bodies(transport: &MockTransport, webhook_host: &str) -> Vec<Value> {
    transport
        .matching(Method::Post, webhook_host)
        .into_iter()
        .filter_map(|r| r.body)
        .collect()
}

pub mod do_fixtures {
    //! DigitalOcean v2 responses

    use super::*;

    pub const HOST: &str = "api.digitalocean.com/v2";

    pub fn route(path: &str) -> String {
        format!("{}{}", HOST, path)
    }

    pub fn snapshot(id: u64, name: &str, created_at: DateTime<Utc>, droplet_id: &str) -> Value {
        json!({
            "id": id.to_string(),
            "name": name,
            "created_at": created_at.to_rfc3339(),
            "resource_id": droplet_id,
            "resource_type": "droplet",
            "regions": ["fra1"],
            "size_gigabytes": 2.36
        })
    }

    /// `count` older snapshots of `server`, oldest first, ids 1000..
    pub fn existing(server: &ServerConfig, count: usize) -> Vec<Value> {
        (0..count)
            .map(|i| {
                let created = day(i);
                snapshot(
                    1000 + i as u64,
                    &format!("{}-{}", server.name, created.format("%Y%m%d%H%M%S")),
                    created,
                    &server.id,
                )
            })
            .collect()
    }

    /// Single-page listing (no `links.pages.next`)
    pub fn page(snapshots: Vec<Value>) -> HttpResponse {
        let total = snapshots.len();
        HttpResponse::json(
            200,
            &json!({"snapshots": snapshots, "links": {}, "meta": {"total": total}}),
        )
    }

    pub fn created(action_id: u64) -> HttpResponse {
        HttpResponse::json(
            201,
            &json!({"action": {"id": action_id, "status": "in-progress", "type": "snapshot"}}),
        )
    }

    pub fn action(action_id: u64, status: &str) -> HttpResponse {
        HttpResponse::json(200, &json!({"action": {"id": action_id, "status": status, "type": "snapshot"}}))
    }

    pub fn error(status: u16, id: &str, message: &str) -> HttpResponse {
        HttpResponse::json(status, &json!({"id": id, "message": message}))
    }

    /// Create, confirm on first poll, list `existing` older snapshots plus
    /// the new one, and accept every delete.
    pub fn happy_path(transport: MockTransport, server: &ServerConfig, existing_count: usize, action_id: u64) -> MockTransport {
        let mut listing = existing(server, existing_count);
        listing.push(snapshot(
            9000 + action_id,
            &format!("{}-new", server.name),
            Utc::now(),
            &server.id,
        ));

        transport
            .on(Method::Post, &route(&format!("/droplets/{}/actions", server.id)), created(action_id))
            .on(Method::Get, &route(&format!("/actions/{}", action_id)), action(action_id, "completed"))
            .on(Method::Get, &route("/snapshots"), page(listing))
            .on(Method::Delete, &route("/snapshots/"), HttpResponse::new(204, ""))
    }
}

pub mod hetzner_fixtures {
    //! Hetzner Cloud v1 responses

    use super::*;

    pub const HOST: &str = "api.hetzner.cloud/v1";

    pub fn route(path: &str) -> String {
        format!("{}{}", HOST, path)
    }

    pub fn image(id: u64, description: &str, created: DateTime<Utc>, server_id: &str) -> Value {
        json!({
            "id": id,
            "type": "snapshot",
            "status": "available",
            "description": description,
            "created": created.to_rfc3339(),
            "created_from": {"id": server_id.parse::<u64>().unwrap_or(0), "name": "server"},
            "image_size": 1.2
        })
    }

    /// `count` older images of `server`, oldest first, ids 2000..
    pub fn existing(server: &ServerConfig, count: usize) -> Vec<Value> {
        (0..count)
            .map(|i| {
                let created = day(i);
                image(
                    2000 + i as u64,
                    &format!("{}-{}", server.name, created.format("%Y%m%d%H%M%S")),
                    created,
                    &server.id,
                )
            })
            .collect()
    }

    /// Single-page listing (`next_page: null`)
    pub fn page(images: Vec<Value>) -> HttpResponse {
        let total = images.len();
        HttpResponse::json(
            200,
            &json!({
                "images": images,
                "meta": {"pagination": {"page": 1, "per_page": 50, "next_page": null, "total_entries": total}}
            }),
        )
    }

    pub fn created(image_id: u64, action_id: u64) -> HttpResponse {
        HttpResponse::json(
            201,
            &json!({
                "image": {"id": image_id, "type": "snapshot", "status": "creating"},
                "action": {"id": action_id, "status": "running", "command": "create_image"}
            }),
        )
    }

    pub fn action(action_id: u64, status: &str) -> HttpResponse {
        HttpResponse::json(200, &json!({"action": {"id": action_id, "status": status, "command": "create_image"}}))
    }

    pub fn error(status: u16, code: &str, message: &str) -> HttpResponse {
        HttpResponse::json(status, &json!({"error": {"code": code, "message": message}}))
    }

    /// Create, confirm on first poll, list `existing` older images plus the
    /// new one, and accept every delete.
    pub fn happy_path(transport: MockTransport, server: &ServerConfig, existing_count: usize, action_id: u64) -> MockTransport {
        let image_id = 9000 + action_id;
        let mut listing = existing(server, existing_count);
        listing.push(image(image_id, &format!("{}-new", server.name), Utc::now(), &server.id));

        transport
            .on(
                Method::Post,
                &route(&format!("/servers/{}/actions/create_image", server.id)),
                created(image_id, action_id),
            )
            .on(Method::Get, &route(&format!("/actions/{}", action_id)), action(action_id, "success"))
            .on(Method::Get, &route("/images"), page(listing))
            .on(Method::Delete, &route("/images/"), HttpResponse::new(204, ""))
    }
}
