use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Aliyun,
    OpenAi,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::Aliyun, ProviderId::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Aliyun => "aliyun",
            ProviderId::OpenAi => "openai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Aliyun => "Alibaba Cloud DashScope",
            ProviderId::OpenAi => "OpenAI",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "aliyun" => Some(ProviderId::Aliyun),
            "openai" => Some(ProviderId::OpenAi),
            _ => None,
        }
    }
}
