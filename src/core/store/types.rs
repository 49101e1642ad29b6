#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Active,
    Paused,
    Ended,
    Error,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
            AgentStatus::Ended => "ended",
            AgentStatus::Error => "error",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(AgentStatus::Idle),
            "active" => Some(AgentStatus::Active),
            "paused" => Some(AgentStatus::Paused),
            "ended" => Some(AgentStatus::Ended),
            "error" => Some(AgentStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Transcript,
    Cards,
    Facts,
}

impl SessionRole {
    pub const ALL: [SessionRole; 3] = [SessionRole::Transcript, SessionRole::Cards, SessionRole::Facts];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionRole::Transcript => "transcript",
            SessionRole::Cards => "cards",
            SessionRole::Facts => "facts",
        }
    }

    pub fn from_role(value: &str) -> Option<Self> {
        match value {
            "transcript" => Some(SessionRole::Transcript),
            "cards" => Some(SessionRole::Cards),
            "facts" => Some(SessionRole::Facts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Realtime,
    Stateless,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Realtime => "realtime",
            Transport::Stateless => "stateless",
        }
    }

    pub fn from_transport(value: &str) -> Option<Self> {
        match value {
            "realtime" => Some(Transport::Realtime),
            "stateless" => Some(Transport::Stateless),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Closed,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Closed => "closed",
            SessionStatus::Error => "error",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "paused" => Some(SessionStatus::Paused),
            "closed" => Some(SessionStatus::Closed),
            "error" => Some(SessionStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Text,
    TextVisual,
    Visual,
}

impl CardType {
    pub fn as_str(self) -> &'static str {
        match self {
            CardType::Text => "text",
            CardType::TextVisual => "text_visual",
            CardType::Visual => "visual",
        }
    }

    pub fn from_card_type(value: &str) -> Option<Self> {
        match value {
            "text" => Some(CardType::Text),
            "text_visual" => Some(CardType::TextVisual),
            "visual" => Some(CardType::Visual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub event_id: String,
    pub status: String,
    pub stage: Option<String>,
    pub realtime_model: String,
    pub stateless_model: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub event_id: String,
    pub agent_id: String,
    pub role: String,
    pub transport: String,
    pub status: String,
    pub provider_session_id: Option<String>,
    pub connection_count: i64,
    pub last_connected_at: Option<String>,
    pub metrics_json: Option<String>,
}

impl SessionRecord {
    pub fn role_enum(&self) -> Option<SessionRole> {
        SessionRole::from_role(&self.role)
    }

    pub fn transport_enum(&self) -> Option<Transport> {
        Transport::from_transport(&self.transport)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FactRecord {
    pub fact_id: String,
    pub event_id: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub last_seen_seq: i64,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CardRecord {
    pub card_id: String,
    pub event_id: String,
    pub concept_id: String,
    pub concept_label: String,
    pub template_id: String,
    pub card_type: String,
    pub body: Option<String>,
    pub label: Option<String>,
    pub visual_request: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub subject_id: String,
    pub event_id: String,
    pub action: String,
    pub before_json: Option<String>,
    pub after_json: Option<String>,
    pub actor: String,
    pub created_at: String,
}
