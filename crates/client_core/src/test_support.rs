//! Scripted `LearningApi` fake shared by the component tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    domain::{NeuroProfile, NeuroProfileId},
    protocol::{AdaptContentResponse, LoginResponse, ProgressEntry, ProgressRecord},
};
use tokio::sync::{oneshot, Mutex};

use crate::{
    error::{ClientError, ClientResult},
    gateway::{BinaryPayload, LearningApi},
};

pub struct Scripted<T> {
    gate: Option<oneshot::Receiver<()>>,
    outcome: ClientResult<T>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Login { email: String },
    Register { email: String },
    Adapt { text: String, token: String },
    Speak { text: String, token: String },
    SetProfile { profile_id: NeuroProfileId, token: String },
    ListProfiles { token: String },
    SaveProgress { entry: ProgressEntry, token: String },
    Analytics { token: String },
}

#[derive(Default)]
pub struct ScriptedApi {
    calls: Mutex<Vec<RecordedCall>>,
    login: Mutex<VecDeque<ClientResult<LoginResponse>>>,
    adapt: Mutex<VecDeque<Scripted<AdaptContentResponse>>>,
    speak: Mutex<VecDeque<Scripted<BinaryPayload>>>,
    set_profile: Mutex<VecDeque<ClientResult<Value>>>,
    profiles: Mutex<Vec<NeuroProfile>>,
}

pub fn request_error(status: u16, message: &str) -> ClientError {
    ClientError::Request {
        status: Some(status),
        message: message.to_string(),
    }
}

pub fn adapted(text: &str) -> AdaptContentResponse {
    AdaptContentResponse {
        adapted_text: text.to_string(),
        original_text: None,
    }
}

pub fn audio(bytes: &[u8]) -> BinaryPayload {
    BinaryPayload {
        content_type: "audio/flac".to_string(),
        bytes: bytes.to_vec(),
    }
}

impl ScriptedApi {
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn push_login(&self, outcome: ClientResult<LoginResponse>) {
        self.login.lock().await.push_back(outcome);
    }

    pub async fn push_adapt(&self, outcome: ClientResult<AdaptContentResponse>) {
        self.adapt.lock().await.push_back(Scripted {
            gate: None,
            outcome,
        });
    }

    /// The call holding this script entry settles once the sender fires.
    pub async fn push_adapt_gated(
        &self,
        outcome: ClientResult<AdaptContentResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.adapt.lock().await.push_back(Scripted {
            gate: Some(rx),
            outcome,
        });
        tx
    }

    pub async fn push_speak(&self, outcome: ClientResult<BinaryPayload>) {
        self.speak.lock().await.push_back(Scripted {
            gate: None,
            outcome,
        });
    }

    pub async fn push_speak_gated(
        &self,
        outcome: ClientResult<BinaryPayload>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.speak.lock().await.push_back(Scripted {
            gate: Some(rx),
            outcome,
        });
        tx
    }

    pub async fn push_set_profile(&self, outcome: ClientResult<Value>) {
        self.set_profile.lock().await.push_back(outcome);
    }

    pub async fn set_catalog(&self, profiles: Vec<NeuroProfile>) {
        *self.profiles.lock().await = profiles;
    }

    async fn record(&self, call: RecordedCall) {
        self.calls.lock().await.push(call);
    }
}

async fn settle<T>(script: Option<Scripted<T>>, fallback: impl FnOnce() -> T) -> ClientResult<T> {
    match script {
        Some(Scripted { gate, outcome }) => {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            outcome
        }
        None => Ok(fallback()),
    }
}

#[async_trait]
impl LearningApi for ScriptedApi {
    async fn login(&self, email: &str, _password: &str) -> ClientResult<LoginResponse> {
        self.record(RecordedCall::Login {
            email: email.to_string(),
        })
        .await;
        let scripted = self.login.lock().await.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(LoginResponse {
                access_token: "token-123".to_string(),
            })
        })
    }

    async fn register(&self, email: &str, _password: &str) -> ClientResult<Value> {
        self.record(RecordedCall::Register {
            email: email.to_string(),
        })
        .await;
        Ok(json!({ "user": { "email": email } }))
    }

    async fn adapt_content(&self, text: &str, token: &str) -> ClientResult<AdaptContentResponse> {
        self.record(RecordedCall::Adapt {
            text: text.to_string(),
            token: token.to_string(),
        })
        .await;
        let script = self.adapt.lock().await.pop_front();
        settle(script, || adapted(text)).await
    }

    async fn text_to_speech(&self, text: &str, token: &str) -> ClientResult<BinaryPayload> {
        self.record(RecordedCall::Speak {
            text: text.to_string(),
            token: token.to_string(),
        })
        .await;
        let script = self.speak.lock().await.pop_front();
        settle(script, || audio(b"default-audio")).await
    }

    async fn set_neuroprofile(
        &self,
        profile_id: NeuroProfileId,
        token: &str,
    ) -> ClientResult<Value> {
        self.record(RecordedCall::SetProfile {
            profile_id,
            token: token.to_string(),
        })
        .await;
        let scripted = self.set_profile.lock().await.pop_front();
        scripted.unwrap_or_else(|| Ok(json!([{ "neuroprofile_id": profile_id }])))
    }

    async fn list_neuroprofiles(&self, token: &str) -> ClientResult<Vec<NeuroProfile>> {
        self.record(RecordedCall::ListProfiles {
            token: token.to_string(),
        })
        .await;
        Ok(self.profiles.lock().await.clone())
    }

    async fn save_progress(&self, entry: &ProgressEntry, token: &str) -> ClientResult<Value> {
        self.record(RecordedCall::SaveProgress {
            entry: entry.clone(),
            token: token.to_string(),
        })
        .await;
        Ok(Value::Null)
    }

    async fn my_analytics(&self, token: &str) -> ClientResult<Vec<ProgressRecord>> {
        self.record(RecordedCall::Analytics {
            token: token.to_string(),
        })
        .await;
        Ok(Vec::new())
    }
}
