use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{required_string, EventError, Item};

/// Attribute names of the originating row.
pub const USER_ID_FIELD: &str = "UserId";
pub const PROMPT_ID_FIELD: &str = "PromptId";
pub const PROMPT_FIELD: &str = "prompt";
pub const INTERACTION_ID_FIELD: &str = "InteractionId";
pub const INTERACTION_TOKEN_FIELD: &str = "InteractionToken";

/// The identity and instruction of a single prompt submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Identifies the requesting user, first half of the row key.
    pub owner_id: String,
    /// Identifies the prompt submission, second half of the row key.
    pub request_id: String,
    pub prompt_text: String,
    /// Opaque correlation values, forwarded as artifact metadata only.
    pub callback_id: String,
    pub callback_token: String,
}

impl GenerationRequest {
    /// Extract a request from a row image. Every field must be a non-empty string.
    pub fn from_image(image: &Item) -> Result<Self, EventError> {
        Ok(Self {
            owner_id: required_string(image, USER_ID_FIELD)?.to_owned(),
            request_id: required_string(image, PROMPT_ID_FIELD)?.to_owned(),
            prompt_text: required_string(image, PROMPT_FIELD)?.to_owned(),
            callback_id: required_string(image, INTERACTION_ID_FIELD)?.to_owned(),
            callback_token: required_string(image, INTERACTION_TOKEN_FIELD)?.to_owned(),
        })
    }
}

/// Knobs of the text-to-image request. Defaults match the body the service has always sent.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub cfg_scale: u32,
    pub height: u32,
    pub width: u32,
    pub sampler: String,
    pub samples: u32,
    pub steps: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            cfg_scale: 8,
            height: 512,
            width: 512,
            sampler: "DDIM".to_owned(),
            samples: 1,
            steps: 50,
        }
    }
}

impl GenerationSettings {
    /// Map a prompt to the request body expected by the model. Pure and total.
    pub fn build(&self, prompt_text: &str) -> GenerationRequestBody {
        GenerationRequestBody {
            cfg_scale: self.cfg_scale,
            height: self.height,
            width: self.width,
            sampler: self.sampler.clone(),
            samples: self.samples,
            steps: self.steps,
            text_prompts: vec![TextPrompt {
                text: prompt_text.to_owned(),
                weight: 1,
            }],
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerationRequestBody {
    pub cfg_scale: u32,
    pub height: u32,
    pub width: u32,
    pub sampler: String,
    pub samples: u32,
    pub steps: u32,
    pub text_prompts: Vec<TextPrompt>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TextPrompt {
    pub text: String,
    pub weight: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct GenerationResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<GeneratedArtifact>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct GeneratedArtifact {
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>,
}

impl GeneratedArtifact {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            base64: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            seed: None,
            finish_reason: Some("SUCCESS".to_owned()),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArtifactDecodeError {
    #[error("model response holds no artifact")]
    NoArtifacts,
    #[error("artifact payload is missing or empty")]
    MissingPayload,
    #[error("artifact payload is not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

impl GenerationResponse {
    /// Decode the first returned artifact into raw image bytes.
    /// Only one sample is requested, so any further artifacts are ignored.
    pub fn decode_first_artifact(&self) -> Result<Vec<u8>, ArtifactDecodeError> {
        let artifact = self
            .artifacts
            .first()
            .ok_or(ArtifactDecodeError::NoArtifacts)?;

        let payload = artifact
            .base64
            .as_deref()
            .filter(|payload| !payload.is_empty())
            .ok_or(ArtifactDecodeError::MissingPayload)?;

        Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AttributeValue;
    use std::collections::HashMap;

    fn image() -> Item {
        HashMap::from([
            (USER_ID_FIELD.to_owned(), AttributeValue::S("u1".to_owned())),
            (PROMPT_ID_FIELD.to_owned(), AttributeValue::S("p1".to_owned())),
            (PROMPT_FIELD.to_owned(), AttributeValue::S("a cat".to_owned())),
            (INTERACTION_ID_FIELD.to_owned(), AttributeValue::S("i1".to_owned())),
            (INTERACTION_TOKEN_FIELD.to_owned(), AttributeValue::S("t1".to_owned())),
            ("Favorite".to_owned(), AttributeValue::Bool(false)),
        ])
    }

    #[test]
    fn extracts_all_fields() {
        let request = GenerationRequest::from_image(&image()).unwrap();

        assert_eq!(
            request,
            GenerationRequest {
                owner_id: "u1".to_owned(),
                request_id: "p1".to_owned(),
                prompt_text: "a cat".to_owned(),
                callback_id: "i1".to_owned(),
                callback_token: "t1".to_owned(),
            }
        );
    }

    #[test]
    fn every_field_is_required() {
        for field in [
            USER_ID_FIELD,
            PROMPT_ID_FIELD,
            PROMPT_FIELD,
            INTERACTION_ID_FIELD,
            INTERACTION_TOKEN_FIELD,
        ] {
            let mut image = image();
            image.remove(field);

            match GenerationRequest::from_image(&image) {
                Err(EventError::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn numeric_prompt_id_is_rejected() {
        let mut image = image();
        image.insert(PROMPT_ID_FIELD.to_owned(), AttributeValue::N("42".to_owned()));

        assert!(matches!(
            GenerationRequest::from_image(&image),
            Err(EventError::WrongFieldType {
                field: PROMPT_ID_FIELD,
                found: "N"
            })
        ));
    }

    #[test]
    fn build_uses_fixed_settings() {
        let body = GenerationSettings::default().build("a cat wearing a hat");

        assert_eq!(body.steps, 50);
        assert_eq!(body.cfg_scale, 8);
        assert_eq!(body.width, 512);
        assert_eq!(body.height, 512);
        assert_eq!(body.samples, 1);
        assert_eq!(body.sampler, "DDIM");
        assert_eq!(
            body.text_prompts,
            vec![TextPrompt {
                text: "a cat wearing a hat".to_owned(),
                weight: 1
            }]
        );
    }

    #[test]
    fn build_accepts_any_prompt() {
        for prompt in ["", "   ", "\"quoted\" {json}", "ünïcödé 🐈"] {
            let body = GenerationSettings::default().build(prompt);
            assert_eq!(body.text_prompts.len(), 1);
            assert_eq!(body.text_prompts[0].text, prompt);
        }
    }

    #[test]
    fn body_serializes_to_model_format() {
        let body = serde_json::to_value(GenerationSettings::default().build("a cat")).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "cfg_scale": 8,
                "height": 512,
                "width": 512,
                "sampler": "DDIM",
                "samples": 1,
                "steps": 50,
                "text_prompts": [{"text": "a cat", "weight": 1}]
            })
        );
    }

    #[test]
    fn decodes_first_artifact() {
        let response: GenerationResponse = serde_json::from_value(serde_json::json!({
            "result": "success",
            "artifacts": [
                {"seed": 1234, "base64": "iVBORw0KGgo=", "finishReason": "SUCCESS"},
                {"seed": 5678, "base64": "AAAA", "finishReason": "SUCCESS"}
            ]
        }))
        .unwrap();

        assert_eq!(
            response.decode_first_artifact().unwrap(),
            vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]
        );
    }

    #[test]
    fn decode_failures() {
        let empty = GenerationResponse::default();
        assert_eq!(
            empty.decode_first_artifact(),
            Err(ArtifactDecodeError::NoArtifacts)
        );

        let missing = GenerationResponse {
            result: None,
            artifacts: vec![GeneratedArtifact::default()],
        };
        assert_eq!(
            missing.decode_first_artifact(),
            Err(ArtifactDecodeError::MissingPayload)
        );

        let blank = GenerationResponse {
            result: None,
            artifacts: vec![GeneratedArtifact {
                base64: Some(String::new()),
                ..Default::default()
            }],
        };
        assert_eq!(
            blank.decode_first_artifact(),
            Err(ArtifactDecodeError::MissingPayload)
        );

        let invalid = GenerationResponse {
            result: None,
            artifacts: vec![GeneratedArtifact {
                base64: Some("not base64!".to_owned()),
                ..Default::default()
            }],
        };
        assert!(matches!(
            invalid.decode_first_artifact(),
            Err(ArtifactDecodeError::InvalidPayload(_))
        ));
    }
}
