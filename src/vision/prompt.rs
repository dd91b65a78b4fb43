//! Prompts for the vision endpoint and speech clean-up of its replies.
//!
//! Every prompt asks for short, plain sentences because the reply goes
//! straight to the speech synthesizer.

use super::VisionMode;

const NAVIGATION: &str = "\
You are helping a visually impaired person navigate safely.
Analyze this image and describe:
1. Any obstacles or objects in their path (specify left, center, or right)
2. Brief navigation advice

Keep your response under 25 words, natural and suitable for text-to-speech.
Example: \"Chair on your left. Clear path ahead. Continue straight.\"
If the path is clear, say \"No obstacles ahead.\"
Do not use special characters or formatting.";

const OCR: &str = "\
Read all visible text in this image.
Provide a clear, natural reading as if speaking to a blind person.
Include brief context about what the text is (sign, label, document, etc).
If no text is visible, say \"No text detected in view.\"
Keep response concise and suitable for text-to-speech.";

const DESCRIBE: &str = "\
Provide a complete scene description for a visually impaired person.
Include:
1. Main objects and their positions
2. Any people present (just count and positions, no identification)
3. Environment description (indoor/outdoor, lighting)
4. Navigation advice

Keep response under 50 words, natural for text-to-speech.";

const CHAT: &str = "\
You are a helpful assistant for a visually impaired person.
Answer their question naturally and concisely.
Keep responses under 50 words unless more detail is specifically requested.
Be warm, helpful, and encouraging.";

/// Instruction text sent alongside the image for `mode`.
pub fn analysis_prompt(mode: VisionMode) -> &'static str {
    match mode {
        VisionMode::Navigation => NAVIGATION,
        VisionMode::Ocr => OCR,
        VisionMode::Describe => DESCRIBE,
    }
}

/// Chat prompt with the user's utterance appended.
pub fn chat_prompt(user_text: &str) -> String {
    format!("{CHAT}\n\nUser says: {}", user_text.trim())
}

/// Strip markdown markers and collapse whitespace so the synthesizer does
/// not read out symbols.
pub fn clean_for_speech(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`'))
        .map(|c| if c == '_' { ' ' } else { c })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
