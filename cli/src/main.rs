use std::io::{self, Read, Write};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use lume_client::net::api::{ApiError, ConversationApi, DEFAULT_BASE_URL, HttpApi};
use lume_client::state::chat::{ChatError, ChatSession};
use lume_client::state::conversations::ConversationStore;
use lume_client::state::outline_editor::{EditorError, OutlineEditor, SlidePatch};
use lume_protocol::{
    ConversationSettings, CreateConversationRequest, SettingsPatch, StreamPart, UiMessage, UpdateConversationRequest,
};
use serde::Serialize;
use tracing::Level;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("read input: {0}")]
    Io(#[from] io::Error),
    #[error("positions start at 1")]
    ZeroPosition,
    #[error("nothing to send; pass a message or pipe one on stdin")]
    EmptyMessage,
}

#[derive(Parser, Debug)]
#[command(name = "lume", about = "Lume chat API CLI")]
struct Cli {
    #[arg(long, env = "LUME_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Caller id forwarded as `x-user-id`.
    #[arg(long, env = "LUME_USER_ID")]
    user_id: Option<Uuid>,

    /// Log client activity to stderr.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    Models,
    Conversation(ConversationCommand),
    Chat(ChatArgs),
    Outline(OutlineCommand),
}

#[derive(Args, Debug)]
struct ConversationCommand {
    #[command(subcommand)]
    command: ConversationSubcommand,
}

#[derive(Subcommand, Debug)]
enum ConversationSubcommand {
    List,
    Show {
        id: Uuid,
    },
    Create {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = false)]
        websearch: bool,
        #[arg(long, default_value_t = false)]
        extended_thinking: bool,
    },
    Rename {
        id: Uuid,
        title: String,
    },
    Settings {
        id: Uuid,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        websearch: Option<bool>,
        #[arg(long)]
        extended_thinking: Option<bool>,
    },
    Delete {
        id: Uuid,
    },
    Clear,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Conversation to continue; a new one is created when omitted.
    #[arg(long)]
    conversation: Option<Uuid>,

    #[arg(long)]
    model: Option<String>,

    /// Retry a failed turn this many times.
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Message text; read from stdin when empty.
    message: Vec<String>,
}

#[derive(Args, Debug)]
struct OutlineCommand {
    artifact_id: Uuid,

    #[command(subcommand)]
    command: OutlineSubcommand,
}

/// Chapter and slide positions are 1-based.
#[derive(Subcommand, Debug)]
enum OutlineSubcommand {
    Show,
    Title {
        title: String,
    },
    ChapterTitle {
        chapter: usize,
        title: String,
    },
    EditSlide {
        chapter: usize,
        slide: usize,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long = "type")]
        slide_type: Option<String>,
    },
    AddSlide {
        chapter: usize,
        #[arg(long)]
        after: Option<usize>,
    },
    DeleteSlide {
        chapter: usize,
        slide: usize,
    },
    MoveChapter {
        from: usize,
        to: usize,
    },
    MoveSlide {
        chapter: usize,
        from: usize,
        to: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::INFO } else { Level::WARN };
    tracing_subscriber::fmt().with_writer(io::stderr).with_max_level(level).init();

    let api = Arc::new(HttpApi::new(&cli.base_url, cli.user_id)?);

    match cli.command {
        Command::Ping => {
            api.health().await?;
            println!("ok");
            Ok(())
        }
        Command::Models => print_json(&api.list_models().await?),
        Command::Conversation(conversation) => run_conversation(&api, conversation).await,
        Command::Chat(args) => run_chat(&api, args).await,
        Command::Outline(outline) => run_outline(&api, outline).await,
    }
}

async fn run_conversation(api: &Arc<HttpApi>, conversation: ConversationCommand) -> Result<(), CliError> {
    let store = ConversationStore::new(api.clone());
    match conversation.command {
        ConversationSubcommand::List => {
            store.refresh().await?;
            for row in store.conversations() {
                println!("{}  {:>4}  {}", row.id, row.message_count, row.title);
            }
            Ok(())
        }
        ConversationSubcommand::Show { id } => print_json(&api.get_conversation(id).await?),
        ConversationSubcommand::Create { title, model, websearch, extended_thinking } => {
            let pending = store.add(CreateConversationRequest {
                id: None,
                title,
                model_id: model,
                settings: Some(ConversationSettings { websearch, extended_thinking }),
            });
            print_json(&pending.confirm().await?)
        }
        ConversationSubcommand::Rename { id, title } => {
            let patch = UpdateConversationRequest { title: Some(title), ..UpdateConversationRequest::default() };
            print_json(&store.update(id, patch).await?)
        }
        ConversationSubcommand::Settings { id, model, websearch, extended_thinking } => {
            let patch = UpdateConversationRequest {
                model_id: model,
                settings: Some(SettingsPatch { websearch, extended_thinking }),
                ..UpdateConversationRequest::default()
            };
            print_json(&store.update(id, patch).await?)
        }
        ConversationSubcommand::Delete { id } => {
            store.delete(id).await?;
            println!("deleted {id}");
            Ok(())
        }
        ConversationSubcommand::Clear => {
            let deleted = store.clear_all().await?;
            println!("deleted {deleted}");
            Ok(())
        }
    }
}

async fn run_chat(api: &Arc<HttpApi>, args: ChatArgs) -> Result<(), CliError> {
    let text = message_text(args.message)?;

    let conversation_id = match args.conversation {
        Some(id) => id,
        None => {
            let store = ConversationStore::new(api.clone());
            let pending = store.add(CreateConversationRequest {
                model_id: args.model.clone(),
                ..CreateConversationRequest::default()
            });
            let created = pending.confirm().await?;
            eprintln!("conversation: {}", created.id);
            created.id
        }
    };

    let mut chat = ChatSession::new(api.clone(), conversation_id);
    chat.set_model(args.model);

    let mut result = chat.send(UiMessage::user_text(text), render_part).await;
    let mut attempts = 0;
    while let Err(error) = &result {
        if attempts >= args.retries || !retryable(error) {
            break;
        }
        attempts += 1;
        eprintln!("retrying ({attempts}/{}): {error}", args.retries);
        result = chat.retry(render_part).await;
    }
    result?;

    if let Some(title) = chat.title() {
        eprintln!("title: {title}");
    }
    Ok(())
}

async fn run_outline(api: &Arc<HttpApi>, outline: OutlineCommand) -> Result<(), CliError> {
    let mut editor = OutlineEditor::open(api.clone(), outline.artifact_id).await?;
    match outline.command {
        OutlineSubcommand::Show => {}
        OutlineSubcommand::Title { title } => editor.update_title(title),
        OutlineSubcommand::ChapterTitle { chapter, title } => {
            editor.update_chapter_title(position(chapter)?, title)?;
        }
        OutlineSubcommand::EditSlide { chapter, slide, title, content, slide_type } => {
            let patch = SlidePatch { slide_title: title, slide_content: content, slide_type };
            editor.update_slide(position(chapter)?, position(slide)?, patch)?;
        }
        OutlineSubcommand::AddSlide { chapter, after } => {
            let after = after.map(position).transpose()?;
            editor.add_slide(position(chapter)?, after)?;
        }
        OutlineSubcommand::DeleteSlide { chapter, slide } => {
            editor.delete_slide(position(chapter)?, position(slide)?)?;
        }
        OutlineSubcommand::MoveChapter { from, to } => {
            editor.reorder_chapters(position(from)?, position(to)?)?;
        }
        OutlineSubcommand::MoveSlide { chapter, from, to } => {
            editor.reorder_slides(position(chapter)?, position(from)?, position(to)?)?;
        }
    }
    if editor.is_dirty() {
        editor.save().await?;
        eprintln!("saved version {}", editor.version());
    }
    print_json(editor.outline())
}

fn render_part(part: &StreamPart) {
    match part {
        StreamPart::TextDelta { delta, .. } => {
            print!("{delta}");
            let _ = io::stdout().flush();
        }
        StreamPart::ReasoningDelta { delta, .. } => eprint!("{delta}"),
        StreamPart::ReasoningEnd { .. } => eprintln!(),
        StreamPart::ToolInputAvailable { tool_name, .. } => eprintln!("[tool] {tool_name}"),
        StreamPart::ToolOutputError { error_text, .. } => eprintln!("[tool error] {error_text}"),
        StreamPart::SourceUrl { url, .. } => eprintln!("[source] {url}"),
        StreamPart::Data { name, id: Some(id), transient: false, .. } if name == "artifact" => {
            eprintln!("[artifact] {id}");
        }
        StreamPart::Error { error_text, code, .. } => eprintln!("[error {code}] {error_text}"),
        StreamPart::Finish { .. } => println!(),
        _ => {}
    }
}

fn retryable(error: &ChatError) -> bool {
    match error {
        ChatError::Turn { retryable, .. } => *retryable,
        ChatError::Interrupted | ChatError::Api(ApiError::Http(_)) => true,
        ChatError::Api(_) | ChatError::NothingToRetry => false,
    }
}

fn message_text(words: Vec<String>) -> Result<String, CliError> {
    let mut text = words.join(" ");
    if text.trim().is_empty() {
        text.clear();
        io::stdin().read_to_string(&mut text)?;
    }
    let text = text.trim().to_owned();
    if text.is_empty() {
        return Err(CliError::EmptyMessage);
    }
    Ok(text)
}

fn position(one_based: usize) -> Result<usize, CliError> {
    one_based.checked_sub(1).ok_or(CliError::ZeroPosition)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
