use shared::AskResponse;

pub const STUB_MODE: &str = "stub";

/// Canned answer. The asset is not looked up and no model is consulted.
pub fn answer_stub(asset_id: &str, question: &str) -> AskResponse {
    AskResponse {
        answer: format!("(stub) You asked: '{}' about asset {}.", question, asset_id),
        evidence: Vec::new(),
        mode: STUB_MODE.to_string(),
    }
}
