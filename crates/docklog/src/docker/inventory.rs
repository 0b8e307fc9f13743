use bollard::models::ContainerSummary;
use serde::Serialize;

/// Compose project label set by `docker compose`.
const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Container identity and metadata derived from Docker's list API.
///
/// Identity is the short 12-character id; names lose their leading slash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Compose project label, when the container belongs to a stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Host-published public ports.
    pub ports: Vec<u16>,
}

/// Truncate a full 64-char container id to the short 12-char form.
pub fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

impl From<ContainerSummary> for ContainerInfo {
    fn from(s: ContainerSummary) -> Self {
        let mut ports: Vec<u16> = s
            .ports
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.public_port)
            .collect();
        ports.sort_unstable();
        ports.dedup();

        let project = s
            .labels
            .as_ref()
            .and_then(|labels| labels.get(COMPOSE_PROJECT_LABEL))
            .cloned();

        Self {
            id: short_id(&s.id.unwrap_or_default()),
            name: s
                .names
                .as_deref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/'))
                .unwrap_or("unknown")
                .to_string(),
            image: s.image.unwrap_or_default(),
            project,
            ports,
        }
    }
}
