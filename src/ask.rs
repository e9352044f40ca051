//! `docdash ask` (one-shot) and `docdash chat` (interactive).
//!
//! The chat loop reads one question per line from stdin. Lines starting
//! with `/` are session commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/reset` | clear history back to the greeting |
//! | `/class <name>` | restrict retrieval to one class (`All` clears it) |
//! | `/limit <n>` | chunks retrieved per question (1–20) |
//! | `/history` | print the conversation so far |
//! | `/quit` | leave |

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use docdash_core::answer::Answer;
use docdash_core::chat::{Role, ANSWER_FAILED};
use docdash_core::session::Session;

use crate::console::Console;

const SOURCE_PREVIEW_CHARS: usize = 160;

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= SOURCE_PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SOURCE_PREVIEW_CHARS).collect();
    format!("{}…", cut)
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer_text);
    if answer.sources.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, s) in answer.sources.iter().enumerate() {
        println!(
            "  {}. {} [{}] chunk {}",
            i + 1,
            s.file_name,
            s.document_class,
            s.chunk_index
        );
        println!("     {}", preview(&s.chunk_text));
    }
    if answer.dropped_chunks > 0 {
        println!(
            "  ({} more hit(s) left out to fit the context limit)",
            answer.dropped_chunks
        );
    }
}

pub async fn run_ask(
    console: &Console,
    question: &str,
    class: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let mut session = console.new_session();
    session.set_class_filter(class);
    if let Some(limit) = limit {
        session.set_result_limit(limit)?;
    }
    let answer = console
        .answer(question, session.class_filter(), session.result_limit())
        .await?;
    print_answer(&answer);
    Ok(())
}

enum Command<'a> {
    Question(&'a str),
    Reset,
    Class(&'a str),
    Limit(&'a str),
    History,
    Quit,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> Command<'_> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Question(line);
    };
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (rest, ""),
    };
    match cmd {
        "reset" => Command::Reset,
        "class" => Command::Class(arg),
        "limit" => Command::Limit(arg),
        "history" => Command::History,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(cmd),
    }
}

fn print_history(session: &Session) {
    for m in session.chat.messages() {
        let who = match m.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("[{}] {}", who, m.content);
    }
}

fn prompt(interactive: bool) {
    if interactive {
        print!("> ");
        let _ = std::io::stdout().flush();
    }
}

pub async fn run_chat(console: &Console, class: Option<&str>, limit: Option<usize>) -> Result<()> {
    let mut session = console.new_session();
    session.set_class_filter(class);
    if let Some(limit) = limit {
        session.set_result_limit(limit)?;
    }

    let interactive = atty::is(atty::Stream::Stdin);
    if let Some(greeting) = session.chat.messages().next() {
        println!("{}", greeting.content);
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(interactive);
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Command::Question("") => {}
            Command::Question(q) => match console.ask(&mut session, q).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => {
                    eprintln!("error: {}", e);
                    println!("{}", ANSWER_FAILED);
                }
            },
            Command::Reset => {
                session.chat.reset();
                println!("history cleared");
            }
            Command::Class(name) => {
                session.set_class_filter(Some(name));
                println!("class filter: {}", session.class_filter().unwrap_or("All"));
            }
            Command::Limit(arg) => match arg.parse::<usize>() {
                Ok(n) => match session.set_result_limit(n) {
                    Ok(()) => println!("result limit: {}", n),
                    Err(e) => eprintln!("error: {}", e),
                },
                Err(_) => eprintln!("error: /limit expects a number"),
            },
            Command::History => print_history(&session),
            Command::Quit => break,
            Command::Unknown(cmd) => eprintln!("unknown command: /{}", cmd),
        }
        println!();
        prompt(interactive);
    }
    Ok(())
}
