use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use travel_sync::{
    config::Config,
    models::{Area, FeedFilter},
    services::Reconciled,
    state::AppState,
    utils::format::{display_date_range, format_cost},
};

const USAGE: &str = "usage: travel-sync <feed [area] [keyword] | detail <id> | like <id> | scrap <id> | login <token> | logout>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting travel-sync against {}", config.api_base_url);

    let state = AppState::init(config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("feed") => feed(&state, args.get(1), args.get(2)).await?,
        Some("detail") => detail(&state, parse_id(args.get(1))?).await?,
        Some("like") => toggle(&state, parse_id(args.get(1))?, false).await?,
        Some("scrap") => toggle(&state, parse_id(args.get(1))?, true).await?,
        Some("login") => {
            let token = args.get(1).ok_or_else(|| anyhow::anyhow!(USAGE))?;
            state.login(token)?;
            println!("로그인되었습니다.");
        }
        Some("logout") => {
            state.logout()?;
            println!("로그아웃되었습니다.");
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn parse_id(raw: Option<&String>) -> anyhow::Result<i64> {
    let raw = raw.ok_or_else(|| anyhow::anyhow!(USAGE))?;
    Ok(raw.parse()?)
}

async fn feed(state: &AppState, area: Option<&String>, keyword: Option<&String>) -> anyhow::Result<()> {
    let area: Area = match area {
        Some(raw) => raw.parse()?,
        None => Area::All,
    };
    let mut filter = FeedFilter::default().with_area(area);
    if let Some(keyword) = keyword {
        filter = filter.with_keyword(keyword);
    }

    let view = state.feed_view(filter);
    view.load_more().await?;
    let snapshot = view.snapshot();

    println!("[{}] {}개", view.key(), snapshot.trips.len());
    for trip in &snapshot.trips {
        println!(
            "#{:<6} {} ({}) {} 조회 {}",
            trip.trip_id,
            trip.title,
            trip.area,
            display_date_range(trip.trip_start_date, trip.trip_end_date),
            trip.view_count
        );
    }
    if snapshot.has_more {
        println!("...");
    }
    Ok(())
}

async fn detail(state: &AppState, id: i64) -> anyhow::Result<()> {
    let view = state.detail_view(id);
    let trip = view.load().await?;

    println!("{} ({})", trip.title, trip.area);
    println!("{}", display_date_range(trip.trip_start_date, trip.trip_end_date));
    if let Some(cost) = trip.cost {
        println!("비용: {}", format_cost(cost));
    }
    if let Some(content) = &trip.content {
        println!("\n{}", content);
    }
    println!("좋아요 {} / 스크랩 {}", trip.is_like, trip.is_scrap);
    Ok(())
}

async fn toggle(state: &AppState, id: i64, scrap: bool) -> anyhow::Result<()> {
    let view = state.detail_view(id);
    view.load().await?;

    let ticket = if scrap { view.toggle_scrap() } else { view.toggle_like() };
    let ticket = match ticket {
        Ok(ticket) => ticket,
        Err(notice) => {
            println!("{}", notice);
            return Ok(());
        }
    };

    match view.settle(ticket).await {
        Reconciled::Applied(value) => println!("{}", if value { "ON" } else { "OFF" }),
        Reconciled::Failed(notice) => {
            error!("Toggle on {} failed", id);
            println!("{}", notice);
        }
        Reconciled::Detached => {}
    }
    Ok(())
}
