//! Fixed interview text and the system prompts sent to the model.

use std::sync::LazyLock;

use regex::Regex;

use crate::screening::state::ConversationState;

/// The nine PHQ-9 items, in order.
pub const PHQ9_QUESTIONS: [&str; 9] = [
    "Little interest or pleasure in doing things?",
    "Feeling down, depressed, or hopeless?",
    "Trouble falling or staying asleep, or sleeping too much?",
    "Feeling tired or having little energy?",
    "Poor appetite or overeating?",
    "Feeling bad about yourself - or that you are a failure or have let yourself or your family down?",
    "Trouble concentrating on things, such as reading the newspaper or watching television?",
    "Moving or speaking so slowly that other people could have noticed? Or the opposite - being so fidgety or restless that you have been moving around a lot more than usual?",
    "Thoughts that you would be better off dead, or of hurting yourself?",
];

/// Answer options, indexed by score.
pub const ANSWER_OPTIONS: [&str; 4] = [
    "Not at all",
    "Several days",
    "More than half the days",
    "Nearly every day",
];

pub const FINANCIAL_QUESTION: &str = "Do you have any financial distress?";
pub const STUDY_QUESTION: &str = "Do you have any study or work-related pressure?";

pub const QUESTIONNAIRE_DONE: &str = "Thank you for answering those questions. I have just a couple more questions to better understand your situation.";

pub const PARSE_FAILURE_REPLY: &str = "I didn't quite catch that. Could you please answer with 'Not at all', 'Several days', 'More than half the days', or 'Nearly every day'?";

pub const ALREADY_SCREENED: &str =
    "You have already completed the screening. Please create a new session if you wish to restart.";

pub const FAREWELL_REPLY: &str = "You're welcome. Take care.";

pub const END_MESSAGE: &str =
    "The conversation has ended. Please refresh the page to start a new session.";

/// Closing keywords that end the advice loop.
static FAREWELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(thanks|thank you|bye|goodbye|done|ok|okay)\b")
        .expect("farewell pattern compiles")
});

/// Affirmative answer to a yes/no question.
static AFFIRMATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(yes|yeah|yep|yup|definitely|absolutely|sometimes|a lot|a bit|a little)\b")
        .expect("affirmative pattern compiles")
});

/// Negation that overrides an affirmative word ("not really", "no").
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(no|nope|nah|not really|not at all|never)\b")
        .expect("negative pattern compiles")
});

pub fn is_farewell(text: &str) -> bool {
    FAREWELL.is_match(text)
}

pub fn is_affirmative(text: &str) -> bool {
    !NEGATIVE.is_match(text) && AFFIRMATIVE.is_match(text)
}

/// Greeting that opens every session.
pub fn welcome_message(name: &str) -> String {
    format!(
        "Hello {name} 😊 I am \"Sahayi\", your trusted mental health companion. \
I'm here to listen and support you. How are you feeling today?"
    )
}

/// First message of the questionnaire: the framing line plus item 1.
pub fn questionnaire_intro() -> String {
    format!(
        "Great, let's get started. Please answer the following questions based on how you've been feeling over the last 2 weeks.\n\n{}",
        PHQ9_QUESTIONS[0]
    )
}

/// Deterministic option list used once model clarifications run out.
pub fn strict_picker(question: &str) -> String {
    let options: Vec<String> = ANSWER_OPTIONS
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{i} - {o}"))
        .collect();
    format!(
        "Let's keep it simple. For \"{question}\", please reply with just the number that fits best:\n{}",
        options.join("\n")
    )
}

pub fn rapport_system_prompt(patient_name: &str) -> String {
    format!(
        "\
You are a compassionate and empathetic mental health assistant.
Your goal is to build rapport with the user, whose name is {patient_name}.
Ask open-ended questions about how they are doing.
Be human-like, warm, and understanding.
Do not start the PHQ-9 questionnaire yet.
Keep the conversation going for a few turns to understand the user's state."
    )
}

pub const PERMISSION_SYSTEM_PROMPT: &str = "\
You are a mental health assistant. You have built rapport with the user.
Now, gently ask for their permission to conduct a brief depression screening (PHQ-9).
Explain that it will help understand their condition better.
Ask ONE clear question the user can say yes or no to.";

/// Consent classifier: judges the reply against the question actually asked.
pub fn consent_prompt(question_asked: &str, reply: &str) -> String {
    format!(
        "\
The assistant asked the user: \"{question_asked}\"
The user replied: \"{reply}\"

Decide whether the user is genuinely agreeing to start the screening questionnaire right now.
A polite acknowledgement, a question back, hesitation, or agreement to something else is NOT consent.

Respond with ONLY a JSON object: {{\"start\": true}} or {{\"start\": false}}"
    )
}

/// Scoring prompt for one questionnaire answer.
pub fn scoring_prompt(question: &str, reply: &str) -> String {
    format!(
        "\
The user was asked: \"{question}\"
The user answered: \"{reply}\"

Task:
1. Determine if the answer is relevant to the question.
2. If relevant, map it to a score: 0 (Not at all), 1 (Several days), 2 (More than half the days), 3 (Nearly every day).
3. If ambiguous or irrelevant, indicate that.

Respond with ONLY a JSON object, no markdown:
{{\"is_relevant\": bool, \"is_ambiguous\": bool, \"score\": 0-3 or null}}"
    )
}

pub fn clarification_prompt(question: &str, reply: &str) -> String {
    format!(
        "\
The user's response \"{reply}\" to the question \"{question}\" was ambiguous or irrelevant.
Politely ask them to clarify it as 'Not at all', 'Several days', 'More than half the days', \
'Nearly every day' or bring them back to the topic. Keep it to two sentences."
    )
}

pub fn advice_system_prompt(state: &ConversationState) -> String {
    let na = "N/A";
    format!(
        "\
You are a mental health assistant.
The user has completed the PHQ-9 screening.
Total Score: {score}

Patient Info: {patient}
Financial Distress: {financial}
Study Pressure: {study}

Engage in a supportive conversation.
Provide empathetic advice and next steps based on the score and context.
If the score is high (>10), suggest professional help.
Address their specific stressors (financial/study) if mentioned.

Do NOT say goodbye unless the user initiates it.
Ask follow-up questions to understand how you can help further.",
        score = state.phq9_total(),
        patient = state.patient_info.as_deref().unwrap_or(na),
        financial = state.financial_distress.as_deref().unwrap_or(na),
        study = state.study_pressure.as_deref().unwrap_or(na),
    )
}

pub fn summary_prompt(existing: &str, transcript: &str) -> String {
    format!(
        "\
Distill the following conversation into a concise summary.
Include key medical details, stressors, and PHQ-9 answers if any.
Existing Summary: {existing}

New Lines:
{transcript}"
    )
}
