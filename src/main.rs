mod api;
mod config;
mod connectivity;
mod quiz;
mod render;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use api::QuizApi;
use config::ClientConfig;
use connectivity::{ConnectivityMonitor, HttpHealthProbe};
use dotenv::dotenv;
use log::{debug, info, warn};
use quiz::session::{Progress, QuizSession};
use quiz::{HistoryEntry, QuizDocument};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, ParseMode},
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type QuizStorage = std::sync::Arc<ErasedStorage<State>>;

// Telegram rejects messages over 4096 characters.
const MESSAGE_LIMIT: usize = 4000;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveMenuChoice,
    ReceiveUrl {
        last_url: Option<String>,
    },
    ReceiveHistoryChoice {
        entries: Vec<HistoryEntry>,
    },
    TakingQuiz {
        session: QuizSession,
        cursor: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine, the variables may come from the environment.
    let env_file_loaded = dotenv().is_ok();

    pretty_env_logger::init();
    info!("Starting quiz bot...");
    if !env_file_loaded {
        debug!("No .env file loaded");
    }

    let config = ClientConfig::from_env()?;
    info!(
        "Backend URL {} (explicitly configured: {}), client host {}",
        config.endpoint.base_url, config.endpoint.explicitly_configured, config.endpoint.client_host
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let monitor = Arc::new(ConnectivityMonitor::new(config.endpoint.clone()));
    let api = Arc::new(QuizApi::new(http.clone(), config.endpoint.clone()));

    {
        let monitor = monitor.clone();
        let probe = HttpHealthProbe::new(http);
        tokio::spawn(async move {
            monitor.run(&probe).await;
        });
    }

    let bot = Bot::from_env();

    info!("Opening dialogue storage at {}", config.db_path);
    let storage: QuizStorage = SqliteStorage::open(&config.db_path, Json).await?.erase();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::filter(|msg: Message| msg.text().is_some_and(is_start_command)).endpoint(start))
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveMenuChoice].endpoint(receive_menu_choice))
            .branch(dptree::case![State::ReceiveUrl { last_url }].endpoint(receive_url))
            .branch(
                dptree::case![State::ReceiveHistoryChoice { entries }]
                    .endpoint(receive_history_choice),
            )
            .branch(dptree::case![State::TakingQuiz { session, cursor }].endpoint(taking_quiz)),
    )
    .dependencies(dptree::deps![storage, api, monitor])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

const GENERATE_QUIZ: &str = "🎯 Generate quiz";
const HISTORY: &str = "📜 History";
const BACKEND_STATUS: &str = "🔧 Backend status";
const RETRY: &str = "🔁 Retry";
const BACK: &str = "⬅️ Back";

const PREVIOUS: &str = "◀️ Previous";
const NEXT: &str = "Next ▶️";
const REVEAL: &str = "👀 Reveal answers";
const CHECK_SCORE: &str = "🏆 Check score";
const RESET: &str = "🔄 Reset quiz";
const MAIN_MENU: &str = "🏠 Main menu";

const GREETING_TEXT: &str = "Hi! Send me a link to a reference article and I'll turn it into a multiple-choice quiz. You can also replay quizzes from the history.";

fn main_menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(GENERATE_QUIZ), KeyboardButton::new(HISTORY)],
        vec![KeyboardButton::new(BACKEND_STATUS)],
    ])
}

async fn show_main_menu(bot: &Bot, dialogue: &QuizDialogue, chat_id: ChatId, text: &str) -> HandlerResult {
    bot.send_message(chat_id, text)
        .reply_markup(main_menu_keyboard())
        .await?;
    dialogue.update(State::ReceiveMenuChoice).await?;
    Ok(())
}

async fn start(
    bot: Bot,
    dialogue: QuizDialogue,
    monitor: Arc<ConnectivityMonitor>,
    msg: Message,
) -> HandlerResult {
    show_main_menu(&bot, &dialogue, msg.chat.id, GREETING_TEXT).await?;
    if let Some(diagnosis) = monitor.diagnosis() {
        bot.send_message(msg.chat.id, diagnosis.to_string()).await?;
    }
    Ok(())
}

/// Tells the user why requests are off and returns `false` when the backend
/// is known to be misconfigured.
async fn ensure_backend(bot: &Bot, chat_id: ChatId, monitor: &ConnectivityMonitor) -> Result<bool, teloxide::RequestError> {
    if monitor.permits_requests() {
        return Ok(true);
    }
    let text = monitor
        .diagnosis()
        .map(|d| d.to_string())
        .unwrap_or_else(|| api::ApiError::NotConfigured.to_string());
    bot.send_message(chat_id, text).await?;
    Ok(false)
}

async fn receive_menu_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    api: Arc<QuizApi>,
    monitor: Arc<ConnectivityMonitor>,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(GENERATE_QUIZ) => {
            ask_for_url(&bot, msg.chat.id).await?;
            dialogue.update(State::ReceiveUrl { last_url: None }).await?;
        }
        Some(HISTORY) => {
            if !ensure_backend(&bot, msg.chat.id, &monitor).await? {
                return Ok(());
            }
            match api.history().await {
                Ok(entries) if entries.is_empty() => {
                    bot.send_message(msg.chat.id, "No quizzes have been generated yet.")
                        .reply_markup(main_menu_keyboard())
                        .await?;
                }
                Ok(entries) => {
                    let mut rows: Vec<Vec<KeyboardButton>> = entries
                        .iter()
                        .map(|entry| vec![KeyboardButton::new(entry.label())])
                        .collect();
                    rows.push(vec![KeyboardButton::new(BACK)]);
                    let parts = render::history_list(&entries);
                    let mut messages = render::pack_messages(parts, MESSAGE_LIMIT).into_iter().peekable();
                    while let Some(text) = messages.next() {
                        let request = bot.send_message(msg.chat.id, text).parse_mode(ParseMode::Html);
                        if messages.peek().is_none() {
                            request.reply_markup(KeyboardMarkup::new(rows.clone())).await?;
                        } else {
                            request.await?;
                        }
                    }
                    dialogue.update(State::ReceiveHistoryChoice { entries }).await?;
                }
                Err(err) => {
                    bot.send_message(msg.chat.id, format!("❗ {}", err))
                        .reply_markup(main_menu_keyboard())
                        .await?;
                }
            }
        }
        Some(BACKEND_STATUS) => {
            bot.send_message(msg.chat.id, render::status_report(&monitor))
                .parse_mode(ParseMode::Html)
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options")
                .reply_markup(main_menu_keyboard())
                .await?;
        }
    }
    Ok(())
}

async fn ask_for_url(bot: &Bot, chat_id: ChatId) -> Result<Message, teloxide::RequestError> {
    bot.send_message(
        chat_id,
        "Send me the URL of the article, e.g. https://en.wikipedia.org/wiki/Alan_Turing",
    )
    .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(BACK)]]))
    .await
}

/// `/start`, `/start@SomeBot` and `/start <payload>` all restart the dialogue.
fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|command| command.split('@').next())
        == Some("/start")
}

/// An absolute http(s) address, or `None` for anything the backend could not fetch.
fn article_url(text: &str) -> Option<String> {
    let url = reqwest::Url::parse(text.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url.to_string()),
        _ => None,
    }
}

async fn receive_url(
    bot: Bot,
    dialogue: QuizDialogue,
    last_url: Option<String>,
    api: Arc<QuizApi>,
    monitor: Arc<ConnectivityMonitor>,
    msg: Message,
) -> HandlerResult {
    let url = match msg.text().map(str::trim) {
        Some(BACK) => {
            return show_main_menu(&bot, &dialogue, msg.chat.id, "What would you like to do?").await;
        }
        Some(RETRY) => match last_url {
            Some(url) => url,
            None => {
                ask_for_url(&bot, msg.chat.id).await?;
                return Ok(());
            }
        },
        Some(text) => match article_url(text) {
            Some(url) => url,
            None => {
                ask_for_url(&bot, msg.chat.id).await?;
                return Ok(());
            }
        },
        None => {
            bot.send_message(msg.chat.id, "Please send the URL as text").await?;
            return Ok(());
        }
    };

    if !ensure_backend(&bot, msg.chat.id, &monitor).await? {
        return Ok(());
    }

    bot.send_message(msg.chat.id, "⏳ Generating the quiz, this can take a minute...")
        .await?;
    // Only cosmetic, so a failure here is ignored.
    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    match api.generate_quiz(&url).await {
        Ok(quiz) => {
            info!("Generated quiz '{}' for {}", quiz.title, url);
            start_quiz(&bot, &dialogue, msg.chat.id, quiz).await
        }
        Err(err) => {
            bot.send_message(msg.chat.id, format!("❗ {}", err))
                .reply_markup(KeyboardMarkup::new(vec![
                    vec![KeyboardButton::new(RETRY)],
                    vec![KeyboardButton::new(BACK)],
                ]))
                .await?;
            dialogue
                .update(State::ReceiveUrl { last_url: Some(url) })
                .await?;
            Ok(())
        }
    }
}

async fn receive_history_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    entries: Vec<HistoryEntry>,
    api: Arc<QuizApi>,
    monitor: Arc<ConnectivityMonitor>,
    msg: Message,
) -> HandlerResult {
    let picked = match msg.text() {
        Some(BACK) => {
            return show_main_menu(&bot, &dialogue, msg.chat.id, "What would you like to do?").await;
        }
        Some(text) => HistoryEntry::id_from_label(text).filter(|id| entries.iter().any(|e| e.id == *id)),
        None => None,
    };
    let Some(id) = picked else {
        bot.send_message(msg.chat.id, "Please pick a quiz from the list").await?;
        return Ok(());
    };

    if !ensure_backend(&bot, msg.chat.id, &monitor).await? {
        return Ok(());
    }

    match api.quiz(id).await {
        Ok(quiz) => {
            info!("Replaying quiz {} '{}'", id, quiz.title);
            start_quiz(&bot, &dialogue, msg.chat.id, quiz).await
        }
        Err(err) => {
            bot.send_message(msg.chat.id, format!("❗ {}", err)).await?;
            Ok(())
        }
    }
}

async fn start_quiz(bot: &Bot, dialogue: &QuizDialogue, chat_id: ChatId, quiz: QuizDocument) -> HandlerResult {
    let overview = render::overview(&quiz);
    let session = QuizSession::new(quiz);
    // Saved first, so a failed send does not lose the fetched quiz.
    dialogue
        .update(State::TakingQuiz {
            session: session.clone(),
            cursor: 0,
        })
        .await?;

    let parts = overview.split("\n\n").map(str::to_string).collect();
    for text in render::pack_messages(parts, MESSAGE_LIMIT) {
        bot.send_message(chat_id, text).parse_mode(ParseMode::Html).await?;
    }
    send_question(bot, chat_id, &session, 0).await?;
    Ok(())
}

fn quiz_keyboard(session: &QuizSession, cursor: usize) -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> = Vec::new();

    // Picking is closed once answers are shown.
    if !session.answers_revealed() {
        if let Some(question) = session.quiz().questions.get(cursor) {
            rows.extend(question.options.iter().map(|o| vec![KeyboardButton::new(o.clone())]));
        }
    }

    rows.push(vec![KeyboardButton::new(PREVIOUS), KeyboardButton::new(NEXT)]);

    let mut actions = Vec::new();
    if !session.answers_revealed() {
        actions.push(KeyboardButton::new(REVEAL));
    }
    if session.can_score() {
        actions.push(KeyboardButton::new(CHECK_SCORE));
    }
    if !actions.is_empty() {
        rows.push(actions);
    }

    rows.push(vec![KeyboardButton::new(RESET), KeyboardButton::new(MAIN_MENU)]);
    KeyboardMarkup::new(rows)
}

async fn send_question(bot: &Bot, chat_id: ChatId, session: &QuizSession, cursor: usize) -> Result<Message, teloxide::RequestError> {
    bot.send_message(chat_id, render::question_prompt(session, cursor))
        .parse_mode(ParseMode::Html)
        .reply_markup(quiz_keyboard(session, cursor))
        .await
}

#[derive(Debug, PartialEq, Eq)]
enum QuizAction {
    Previous,
    Next,
    Reveal,
    Score,
    Reset,
    Menu,
    Answer(String),
}

impl QuizAction {
    fn parse(text: &str) -> Self {
        match text {
            PREVIOUS => QuizAction::Previous,
            NEXT => QuizAction::Next,
            REVEAL => QuizAction::Reveal,
            CHECK_SCORE => QuizAction::Score,
            RESET => QuizAction::Reset,
            MAIN_MENU => QuizAction::Menu,
            // Anything else counts as an answer, even if it is no option.
            other => QuizAction::Answer(other.to_string()),
        }
    }
}

async fn taking_quiz(
    bot: Bot,
    dialogue: QuizDialogue,
    (mut session, cursor): (QuizSession, usize),
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please answer with one of the options").await?;
        return Ok(());
    };

    let count = session.question_count();
    if count == 0 {
        return show_main_menu(&bot, &dialogue, msg.chat.id, "This quiz has no questions.").await;
    }
    let mut cursor = cursor.min(count.saturating_sub(1));

    match QuizAction::parse(text) {
        QuizAction::Previous => {
            cursor = (cursor + count - 1) % count;
        }
        QuizAction::Next => {
            cursor = (cursor + 1) % count;
        }
        QuizAction::Answer(option) => match session.select_answer(cursor, option) {
            Ok(()) => {
                if session.progress() == Progress::FullyAnswered {
                    bot.send_message(
                        msg.chat.id,
                        "✔️ Every question is answered. Check your score or reveal the answers.",
                    )
                    .await?;
                }
                cursor = session.next_unanswered(cursor + 1).unwrap_or(cursor);
            }
            Err(err) => {
                debug!("Selection refused: {}", err);
                bot.send_message(msg.chat.id, format!("{}.", err)).await?;
            }
        },
        QuizAction::Reveal => {
            session.reveal_answers();
            info!("Answers revealed for '{}'", session.quiz().title);
            for text in render::pack_messages(render::answer_sheet(&session), MESSAGE_LIMIT) {
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        QuizAction::Score => match session.compute_score() {
            Some(score) => {
                info!("Scored {}/{} on '{}'", score, count, session.quiz().title);
                if let Some(line) = render::score_line(&session) {
                    bot.send_message(msg.chat.id, line).await?;
                }
            }
            None => {
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "Answer every question first ({} of {} answered).",
                        session.answered_count(),
                        count
                    ),
                )
                .await?;
            }
        },
        QuizAction::Reset => {
            session.reset();
            cursor = 0;
            info!("Quiz '{}' reset", session.quiz().title);
            bot.send_message(msg.chat.id, "🔄 Quiz reset, good luck!").await?;
        }
        QuizAction::Menu => {
            return show_main_menu(&bot, &dialogue, msg.chat.id, "What would you like to do?").await;
        }
    }

    if let Err(err) = send_question(&bot, msg.chat.id, &session, cursor).await {
        warn!("Could not send question {}: {}", cursor, err);
        return Err(err.into());
    }
    dialogue
        .update(State::TakingQuiz { session, cursor })
        .await?;
    Ok(())
}
