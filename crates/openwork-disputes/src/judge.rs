//! The automated dispute judge

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use openwork_types::{Agent, DisputeResolution, JudgeVerdict, Task, WorkError, WorkResult};

/// Evaluates a disputed delivery and recommends a funds allocation
///
/// Every failure mode surfaces as `JudgeFailed`; the resolver maps all of
/// them to the deterministic fallback.
#[async_trait]
pub trait DisputeJudge: Send + Sync {
    async fn evaluate(&self, task: &Task, agent: &Agent) -> WorkResult<JudgeVerdict>;
}

/// Configuration for the HTTP judge
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// OpenAI-compatible chat completions base URL
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl JudgeConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENWORK_JUDGE_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
            api_key: std::env::var("OPENWORK_JUDGE_API_KEY").ok(),
            model: std::env::var("OPENWORK_JUDGE_MODEL")
                .unwrap_or_else(|_| "llama3.1:8b".to_string()),
        }
    }
}

/// Judge backed by an OpenAI-compatible chat completions endpoint
pub struct HttpJudge {
    config: JudgeConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// The JSON shape the model is instructed to produce
#[derive(Deserialize)]
struct RawVerdict {
    recommendation: String,
    #[serde(default)]
    refund_percentage: Option<u8>,
    score: u8,
    completeness: u8,
    quality_vs_portfolio: u8,
    reasoning: String,
}

const SYSTEM_PROMPT: &str = "You are an impartial arbiter for a task \
marketplace. A poster paid for work, the agent delivered, and one party \
disputes the outcome. Judge only what is in front of you: the task \
description, the structured inputs, the delivered payload and the agent's \
declared portfolio style. Respond with a single JSON object: \
{\"recommendation\": \"full_refund\" | \"full_payout\" | \"partial_split\", \
\"refund_percentage\": <0-100, required for partial_split>, \
\"score\": <0-100>, \"completeness\": <0-100>, \
\"quality_vs_portfolio\": <0-100>, \"reasoning\": \"<short explanation>\"}.";

impl HttpJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(JudgeConfig::from_env())
    }

    fn case_prompt(task: &Task, agent: &Agent) -> String {
        let inputs = task
            .task_inputs
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string());
        let deliverables = task
            .deliverables
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none submitted".to_string());
        let style = agent
            .style_profile
            .as_deref()
            .unwrap_or("no portfolio style declared");

        format!(
            "Task title: {}\nTask description: {}\nRequired skills: {}\n\
             Budget: {}\nTask inputs: {}\nDeliverables: {}\n\
             Agent portfolio style: {}",
            task.title,
            task.description,
            task.required_skills.join(", "),
            task.budget,
            inputs,
            deliverables,
            style,
        )
    }

    fn parse_verdict(content: &str) -> WorkResult<JudgeVerdict> {
        let raw: RawVerdict =
            serde_json::from_str(content).map_err(|e| WorkError::JudgeFailed {
                message: format!("verdict is not valid JSON: {}", e),
            })?;

        let recommendation = match raw.recommendation.as_str() {
            "full_refund" => DisputeResolution::FullRefund,
            "full_payout" => DisputeResolution::FullPayout,
            "partial_split" => {
                let refund_percentage =
                    raw.refund_percentage.ok_or_else(|| WorkError::JudgeFailed {
                        message: "partial_split verdict without refund_percentage".to_string(),
                    })?;
                if refund_percentage > 100 {
                    return Err(WorkError::JudgeFailed {
                        message: format!(
                            "refund_percentage {} out of range",
                            refund_percentage
                        ),
                    });
                }
                DisputeResolution::PartialSplit { refund_percentage }
            }
            other => {
                return Err(WorkError::JudgeFailed {
                    message: format!("unknown recommendation {:?}", other),
                })
            }
        };

        for (label, value) in [
            ("score", raw.score),
            ("completeness", raw.completeness),
            ("quality_vs_portfolio", raw.quality_vs_portfolio),
        ] {
            if value > 100 {
                return Err(WorkError::JudgeFailed {
                    message: format!("{} {} out of range", label, value),
                });
            }
        }

        Ok(JudgeVerdict {
            recommendation,
            score: raw.score,
            completeness: raw.completeness,
            quality_vs_portfolio: raw.quality_vs_portfolio,
            reasoning: raw.reasoning,
        })
    }
}

#[async_trait]
impl DisputeJudge for HttpJudge {
    async fn evaluate(&self, task: &Task, agent: &Agent) -> WorkResult<JudgeVerdict> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::case_prompt(task, agent),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| WorkError::JudgeFailed {
            message: format!("judge endpoint unreachable: {}", e),
        })?;

        if !response.status().is_success() {
            return Err(WorkError::JudgeFailed {
                message: format!("judge endpoint returned {}", response.status()),
            });
        }

        let body: ChatResponse =
            response.json().await.map_err(|e| WorkError::JudgeFailed {
                message: format!("malformed judge response: {}", e),
            })?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| WorkError::JudgeFailed {
                message: "judge response contained no choices".to_string(),
            })?;

        let verdict = Self::parse_verdict(content)?;
        info!(task = %task.id, recommendation = %verdict.recommendation, score = verdict.score,
              "judge verdict rendered");
        Ok(verdict)
    }
}

/// Judge with a canned outcome, for tests
pub struct ScriptedJudge {
    outcome: std::sync::Mutex<Option<WorkResult<JudgeVerdict>>>,
}

impl ScriptedJudge {
    pub fn verdict(verdict: JudgeVerdict) -> Self {
        Self {
            outcome: std::sync::Mutex::new(Some(Ok(verdict))),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: std::sync::Mutex::new(Some(Err(WorkError::JudgeFailed {
                message: message.into(),
            }))),
        }
    }
}

#[async_trait]
impl DisputeJudge for ScriptedJudge {
    async fn evaluate(&self, _task: &Task, _agent: &Agent) -> WorkResult<JudgeVerdict> {
        self.outcome
            .lock()
            .expect("scripted judge poisoned")
            .take()
            .unwrap_or_else(|| {
                Err(WorkError::JudgeFailed {
                    message: "scripted judge already consumed".to_string(),
                })
            })
    }
}
