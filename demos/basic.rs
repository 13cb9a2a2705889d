use std::time::Duration;

use resilient_api_client::{HttpApiClient, PolicyUpdate, ResilientClient, StatusPoller};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = HttpApiClient::from_env()?;
    let client = ResilientClient::new(api);
    client.update_config(PolicyUpdate::default().max_retries(2))?;

    let stats: Value = client.get("/dashboard/stats", [("range", "month")]).await?;
    println!("dashboard: {stats}");

    let push: Value = client
        .post(
            "/payments/stk-push",
            &json!({"phone": "254700000001", "amount": 500}),
        )
        .await?;
    println!("stk push: {push}");

    let checkout_id = push["checkout_request_id"].as_str().unwrap_or_default().to_owned();
    let status = StatusPoller::new(client.clone(), "/payments/status")
        .with_params([("checkout_request_id", checkout_id)])
        .with_interval(Duration::from_secs(3))
        .poll_field("status", &["completed", "failed", "cancelled"])
        .await?;
    println!("payment: {status}");

    client.shutdown();
    Ok(())
}
