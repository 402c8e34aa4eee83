//! Stateless client commands.
//!
//! Each command is one HTTP call against a running daemon's local API;
//! the response body is printed as-is. The bearer token comes from
//! `AGENTNET_TOKEN` or the daemon's `api.token` file.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::config::{default_data_dir, Command, DEFAULT_API_ADDR};

pub async fn run(command: Command) -> Result<()> {
    match command {
        Command::Daemon(_) => unreachable!("daemon command is dispatched in main"),
        Command::Status => get("/status").await,
        Command::Rooms => get("/rooms").await,
        Command::Create { room, topic } => {
            post(
                "/rooms/create",
                Some(json!({ "room": room, "topic": topic.join(" "), "tags": [] })),
            )
            .await
        }
        Command::Join { room } => post("/rooms/join", Some(json!({ "room": room }))).await,
        Command::Leave { room } => post("/rooms/leave", Some(json!({ "room": room }))).await,
        Command::Send { room, text } => {
            post("/send", Some(json!({ "room": room, "text": text.join(" ") }))).await
        }
        Command::Messages { room } => {
            let path = match room {
                Some(room) => format!("/messages?room={room}"),
                None => "/messages".to_string(),
            };
            get(&path).await
        }
        Command::History { room, limit } => {
            get(&format!("/history?room={room}&limit={limit}")).await
        }
        Command::Stop => post("/stop", None).await,
    }
}

fn api_url() -> String {
    if let Ok(url) = std::env::var("AGENTNET_API_URL") {
        if !url.is_empty() {
            return url;
        }
    }
    if let Ok(addr) = std::env::var("AGENTNET_API") {
        if !addr.is_empty() {
            return format!("http://{addr}");
        }
    }
    format!("http://{DEFAULT_API_ADDR}")
}

fn api_token() -> String {
    if let Ok(token) = std::env::var("AGENTNET_TOKEN") {
        if !token.is_empty() {
            return token;
        }
    }
    let Ok(data_dir) = (match std::env::var("AGENTNET_DATA_DIR") {
        Ok(dir) if !dir.is_empty() => Ok(std::path::PathBuf::from(dir)),
        _ => default_data_dir(),
    }) else {
        return String::new();
    };
    std::fs::read_to_string(data_dir.join("api.token"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

async fn get(path: &str) -> Result<()> {
    request(reqwest::Method::GET, path, None).await
}

async fn post(path: &str, body: Option<Value>) -> Result<()> {
    request(reqwest::Method::POST, path, body).await
}

async fn request(method: reqwest::Method, path: &str, body: Option<Value>) -> Result<()> {
    let url = format!("{}{path}", api_url());
    let client = reqwest::Client::new();

    let mut req = client
        .request(method, &url)
        .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", api_token()));
    if let Some(body) = body {
        req = req.json(&body);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("{e} (is the daemon running?)"))?;

    if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
        bail!("unauthorized (check AGENTNET_TOKEN or the daemon's api.token file)");
    }

    let text = resp.text().await.context("read response")?;
    println!("{text}");
    Ok(())
}
