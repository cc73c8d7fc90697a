//! Prompt templates.

use ragbot_core::SearchHit;

/// Prompt asking the model to answer `query` from `references`.
pub fn document_prompt(query: &str, references: &[SearchHit]) -> String {
    let mut prompt = String::from("Based on the following documents:\n");
    for hit in references {
        prompt.push_str(&format!("\"\"\"{}\"\"\",\n", hit.content));
    }
    prompt.push_str(&format!("Answer the question: {}", query));
    prompt
}

/// Prompt continuing a friendly conversation.
pub fn conversation_prompt(history: &str, input: &str) -> String {
    format!(
        "\nThe following is a friendly conversation between a human and an AI. \
         The AI answers the human's questions as well as it can.\n\
         Current conversation:\n{}\nHuman: {}\nAI:",
        history, input
    )
}
