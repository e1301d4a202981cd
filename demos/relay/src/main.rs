use std::path::PathBuf;

use dormant::prelude::*;

/// Settings read from the environment.
#[derive(Debug, PartialEq)]
struct Settings {
    bind: String,
    status_bind: Option<String>,
    data_dir: Option<PathBuf>,
}

impl Settings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind: lookup("DORMANT_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            status_bind: lookup("DORMANT_STATUS_BIND"),
            data_dir: lookup("DORMANT_DATA_DIR").map(PathBuf::from),
        }
    }

    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }
}

async fn serve<S: BlobStore>(
    builder: DormantServerBuilder<S>,
    settings: &Settings,
) -> Result<(), DormantError> {
    let mut builder = builder.bind(&settings.bind);
    if let Some(addr) = &settings.status_bind {
        builder = builder.status_bind(addr);
    }
    builder.build().await?.run().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    tracing::info!(bind = %settings.bind, status = ?settings.status_bind, data = ?settings.data_dir, "starting relay");

    match &settings.data_dir {
        Some(dir) => {
            let store = FileStore::open(dir).await?;
            serve(DormantServer::builder().store(store), &settings).await?;
        }
        None => serve(DormantServer::builder(), &settings).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(
            settings,
            Settings {
                bind: "0.0.0.0:8080".into(),
                status_bind: None,
                data_dir: None,
            }
        );
    }

    #[test]
    fn test_settings_from_env_vars() {
        let settings = Settings::from_lookup(lookup(&[
            ("DORMANT_BIND", "127.0.0.1:9000"),
            ("DORMANT_STATUS_BIND", "127.0.0.1:9001"),
            ("DORMANT_DATA_DIR", "/var/lib/dormant"),
        ]));
        assert_eq!(settings.bind, "127.0.0.1:9000");
        assert_eq!(settings.status_bind.as_deref(), Some("127.0.0.1:9001"));
        assert_eq!(settings.data_dir, Some(PathBuf::from("/var/lib/dormant")));
    }

    #[tokio::test]
    async fn test_relay_greets_connection() {
        let server = DormantServer::builder()
            .bind("127.0.0.1:0")
            .build()
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/demo"))
            .await
            .unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Binary(data) = msg else {
            panic!("expected a binary frame");
        };
        assert!(matches!(Frame::decode(&data).unwrap(), Frame::Application(_)));
    }
}
