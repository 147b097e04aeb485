use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use farewell_companion::app::AppContext;
use farewell_companion::catalog::{self, FAREWELL_KINDS, TOMB_STYLES};
use farewell_companion::config::AppConfig;
use farewell_companion::errors::{user_message, RecoveryOption};
use farewell_companion::models::Author;
use farewell_companion::session::{FarewellContext, FarewellSession, FlowState, SendOutcome};

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farewell_companion=debug".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let app = AppContext::build(&config)
        .await
        .context("failed to initialise the local store")?;
    info!("Ready, default backend {}", config.api_base_url);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    print_help();

    while let Some(line) = prompt(&mut input, "> ").await? {
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next(), words.next()) {
            (Some("new"), ..) => run_flow(&app, &mut input).await?,
            (Some("list"), ..) => list_cemetery(&app).await,
            (Some("flower"), Some(id), ..) => match app.farewells.offer_flower(id).await {
                Ok(count) => println!("已献上 {count} 朵小花"),
                Err(e) => println!("{}", user_message(&e)),
            },
            (Some("delete"), Some(id), ..) => match app.farewells.delete_by_id(id).await {
                Ok(true) => println!("已删除"),
                Ok(false) => println!("找不到这条告别记录"),
                Err(e) => println!("{}", user_message(&e)),
            },
            (Some("status"), ..) => {
                let ok = app.gateway.check_connection().await;
                println!("{} {}", app.gateway.resolver().current(), if ok { "已连接" } else { "未连接" });
            }
            (Some("register"), Some(email), Some(password), name) => match &app.auth {
                Some(auth) => report_auth(auth.register(email, password, name).await),
                None => println!("未配置登录服务"),
            },
            (Some("login"), Some(email), Some(password), _) => match &app.auth {
                Some(auth) => report_auth(auth.login(email, password).await),
                None => println!("未配置登录服务"),
            },
            (Some("logout"), ..) => match &app.auth {
                Some(auth) => report_auth(auth.logout().await),
                None => println!("未配置登录服务"),
            },
            (Some("quit"), ..) => break,
            (None, ..) => {}
            _ => print_help(),
        }
    }
    Ok(())
}

fn print_help() {
    println!("commands: new | list | flower <id> | delete <id> | status");
    println!("          register <email> <password> [name] | login <email> <password> | logout | quit");
}

async fn prompt(input: &mut Input, label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|l| l.trim().to_string()))
}

/// Reads a 1-based choice; anything else picks the first entry.
async fn choose(input: &mut Input, label: &str, len: usize) -> anyhow::Result<usize> {
    let answer = prompt(input, label).await?.unwrap_or_default();
    Ok(answer.parse::<usize>().ok().filter(|n| (1..=len).contains(n)).unwrap_or(1) - 1)
}

async fn run_flow(app: &AppContext, input: &mut Input) -> anyhow::Result<()> {
    for (i, kind) in FAREWELL_KINDS.iter().enumerate() {
        println!("  {}. {}：{}", i + 1, kind.name, kind.description);
    }
    let kind = &FAREWELL_KINDS[choose(input, "告别类型: ", FAREWELL_KINDS.len()).await?];
    let theme = prompt(input, "告别主题: ").await?.unwrap_or_default();
    for (i, style) in TOMB_STYLES.iter().enumerate() {
        println!("  {}. {}", i + 1, style.name);
    }
    let style = &TOMB_STYLES[choose(input, "墓碑风格: ", TOMB_STYLES.len()).await?];

    let mut session = app
        .sessions
        .create(FarewellContext::new(kind.id, theme, style.id))
        .await;
    print_last(&session);
    for prompt_text in session.guide_prompts() {
        println!("  · {prompt_text}");
    }
    println!("(/guide 获取引导, /retry 重新发送, /reconnect 重新连接, /done 完成告别, /cancel 放弃)");

    while let Some(line) = prompt(input, "你: ").await? {
        match line.as_str() {
            "/done" => {
                let record = session.complete();
                let name = record.name.clone();
                match app.farewells.append(record).await {
                    Ok(()) => println!("再见，{name}。已放入内心墓园。"),
                    Err(e) => println!("{}", user_message(&e)),
                }
                return Ok(());
            }
            "/cancel" => return Ok(()),
            "/reconnect" => {
                let base = app.gateway.reconnect().await;
                println!("当前服务: {base}");
            }
            "/guide" => {
                let name = session
                    .farewell_name()
                    .unwrap_or_else(|| catalog::farewell_kind(&session.context().farewell_type)
                        .map(|k| k.name)
                        .unwrap_or(catalog::DEFAULT_THEME))
                    .to_string();
                match app.gateway.guidance(&session.context().farewell_type, &name).await {
                    Ok(guidance) => println!("引导: {}", guidance.guidance_text),
                    Err(e) => println!("{}", user_message(&e)),
                }
            }
            "/retry" => report_send(&session.retry_last(&app.gateway).await, &session),
            text => report_send(&session.send_message(&app.gateway, text).await, &session),
        }
    }
    Ok(())
}

fn report_send(
    result: &Result<SendOutcome, farewell_companion::session::SendFailure>,
    session: &FarewellSession,
) {
    match result {
        Ok(SendOutcome::Ignored) => {}
        Ok(SendOutcome::Replied { suggestions }) => {
            print_last(session);
            for s in suggestions {
                println!("  · {s}");
            }
            if session.state() == FlowState::ReadyToComplete {
                println!("(可以输入 /done 完成这次告别了)");
            }
        }
        Err(failure) => {
            println!("{}", failure.message);
            let choices: Vec<_> = failure.options.iter().map(RecoveryOption::label).collect();
            println!("[{}]", choices.join(" / "));
        }
    }
}

fn print_last(session: &FarewellSession) {
    if let Some(m) = session.messages().last().filter(|m| m.author == Author::Assistant) {
        println!("信使: {}", m.text);
    }
}

async fn list_cemetery(app: &AppContext) {
    let records = match app.farewells.find_all().await {
        Ok(records) => records,
        Err(e) => {
            println!("{}", user_message(&e));
            return;
        }
    };
    if records.is_empty() {
        println!("内心墓园还是空的");
    }
    for r in records {
        let flowers = app.farewells.flower_count(&r.id).await.unwrap_or(0);
        let style = catalog::tomb_style(&r.image).name;
        println!("[{}] {} {} ({}) ♥{}  {}", r.id, r.name, r.date, style, flowers, r.goodbye_text);
    }
}

fn report_auth(resp: farewell_companion::auth::AuthResponse) {
    match (resp.success, resp.user, resp.error) {
        (true, Some(user), _) => println!("已登录: {}", user.email.unwrap_or(user.id)),
        (true, None, _) => println!("完成"),
        (false, _, error) => println!("{}", error.unwrap_or_default()),
    }
}
