//! HTML message bodies sent to the chat.

use teloxide::utils::html::{bold, escape, italic};

use crate::connectivity::{ConnectivityMonitor, Context};
use crate::quiz::session::QuizSession;
use crate::quiz::{HistoryEntry, QuizDocument};

pub fn overview(quiz: &QuizDocument) -> String {
    let mut out = format!("📚 {}\n\n{}", bold(&escape(&quiz.title)), escape(&quiz.summary));

    let entities = [
        ("👥 People", &quiz.key_entities.people),
        ("🏢 Organizations", &quiz.key_entities.organizations),
        ("📍 Locations", &quiz.key_entities.locations),
    ];
    if entities.iter().any(|(_, items)| !items.is_empty()) {
        out.push_str(&format!("\n\n{}", bold("🔍 Key entities")));
        for (label, items) in entities {
            if !items.is_empty() {
                out.push_str(&format!("\n{}: {}", label, escape(&items.join(", "))));
            }
        }
    }
    push_list(&mut out, "📑 Sections", &quiz.sections);
    push_list(&mut out, "🔗 Related topics", &quiz.related_topics);

    out.push_str(&format!(
        "\n\n{} question(s). Pick an option on the keyboard to answer.",
        quiz.question_count()
    ));
    out
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    if !items.is_empty() {
        out.push_str(&format!("\n\n{}\n{}", bold(label), escape(&items.join(" · "))));
    }
}

pub fn question_prompt(session: &QuizSession, index: usize) -> String {
    if index >= session.question_count() {
        return String::new();
    }

    format!(
        "Question {} of {}\n{}\n\n{}",
        index + 1,
        session.question_count(),
        question_block(session, index),
        italic(&format!(
            "Answered {} of {}",
            session.answered_count(),
            session.question_count()
        ))
    )
}

/// Every question with its options marked, one entry per question.
pub fn answer_sheet(session: &QuizSession) -> Vec<String> {
    (0..session.question_count())
        .map(|index| format!("{}. {}", index + 1, question_block(session, index)))
        .collect()
}

/// A question with its options marked from the current session. Explanation
/// and difficulty are only shown once answers are revealed.
fn question_block(session: &QuizSession, index: usize) -> String {
    let Some(question) = session.quiz().questions.get(index) else {
        return String::new();
    };
    let revealed = session.answers_revealed();

    let mut block = bold(&escape(&question.text));
    for option in &question.options {
        let mark = session.option_mark(index, option);
        let symbol = if mark.wrong_pick {
            "❌"
        } else if mark.correct {
            "✅"
        } else if mark.picked {
            "🔘"
        } else {
            "▫️"
        };
        block.push_str(&format!("\n{} {}", symbol, escape(option)));
    }
    // Free-text picks match no option, so list them separately.
    if let Some(pick) = session.selection(index) {
        if !question.options.iter().any(|o| o == pick) {
            let symbol = if revealed { "❌" } else { "🔘" };
            block.push_str(&format!("\n{} {}", symbol, escape(pick)));
        }
    }
    if revealed {
        if !question.explanation.is_empty() {
            block.push_str(&format!("\n💡 {}", escape(&question.explanation)));
        }
        if !question.difficulty.is_empty() {
            block.push_str(&format!(
                "\n{}",
                italic(&format!("Difficulty: {}", escape(&question.difficulty)))
            ));
        }
    }
    block
}

/// Joins `parts` into as few messages as fit under `limit` bytes each. A part
/// that alone exceeds `limit` is split first.
pub fn pack_messages(parts: Vec<String>, limit: usize) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();
    for part in parts.iter().flat_map(|part| split_part(part, limit)) {
        match messages.last_mut() {
            Some(last) if last.len() + 2 + part.len() <= limit => {
                last.push_str("\n\n");
                last.push_str(&part);
            }
            _ => messages.push(part),
        }
    }
    messages
}

/// Cuts `part` into pieces of at most `limit` bytes, preferring whitespace and
/// never cutting through a char, an HTML tag or an entity.
fn split_part(part: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = part;
    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if let Some(open) = rest[..cut].rfind(['<', '&']) {
            if !rest[open..cut].contains(['>', ';']) {
                cut = open;
            }
        }
        if let Some(space) = rest[..cut].rfind(['\n', ' ']) {
            if space >= cut / 2 {
                cut = space;
            }
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let piece = rest[..cut].trim_end();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() || pieces.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

pub fn score_line(session: &QuizSession) -> Option<String> {
    let score = session.score()?;
    let percentage = session.percentage()?;
    Some(format!(
        "🎉 Your score: {}/{} ({}%)",
        score,
        session.question_count(),
        percentage
    ))
}

/// The header, one block per entry, then the footer.
pub fn history_list(entries: &[HistoryEntry]) -> Vec<String> {
    let mut parts = vec![bold("📜 Quiz history")];
    for entry in entries {
        let mut block = escape(&entry.label());
        if let Some(url) = &entry.url {
            block.push_str(&format!("\n{}", escape(url)));
        }
        if let Some(date) = &entry.date_generated {
            block.push_str(&format!("\n{}", italic(&escape(date))));
        }
        parts.push(block);
    }
    parts.push("Pick one to take it again.".to_string());
    parts
}

/// Configuration and connectivity as the client sees them.
pub fn status_report(monitor: &ConnectivityMonitor) -> String {
    let endpoint = monitor.endpoint();
    let mut out = format!(
        "{}\nBackend URL: {}\nConfigured explicitly: {}\nClient host: {}\nDeployed: {}\nStatus: {}",
        bold("🔧 Backend status"),
        escape(&endpoint.base_url),
        if endpoint.explicitly_configured { "yes" } else { "no" },
        escape(&endpoint.client_host),
        if endpoint.context == Context::Deployed { "yes" } else { "no" },
        monitor.state()
    );
    if let Some(diagnosis) = monitor.diagnosis() {
        out.push_str(&format!("\n\n{}", escape(&diagnosis.to_string())));
    }
    out
}
