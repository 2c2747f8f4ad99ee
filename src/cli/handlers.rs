use tokio::sync::watch;

use super::{AppState, CliError, Command};
use crate::core::storage::models::{NewFeed, UserRecord};
use crate::core::sync::{parse_interval, Ingestor};

pub async fn login(state: &mut AppState, command: Command) -> Result<(), CliError> {
    let name = require_arg(&command, 0, "feedr login <name>")?;
    let Some(user) = state.repository.get_user_by_name(name).await? else {
        return Err(CliError::Message(format!(
            "user {name} does not exist; register first"
        )));
    };
    state.config.set_user(&user.name)?;
    println!("Logged in as {}", user.name);
    Ok(())
}

pub async fn register(state: &mut AppState, command: Command) -> Result<(), CliError> {
    let name = require_arg(&command, 0, "feedr register <name>")?;
    let user = match state.repository.create_user(name).await {
        Ok(user) => user,
        Err(err) if err.is_unique_violation() => {
            return Err(CliError::Message(format!("user {name} already exists")));
        }
        Err(err) => return Err(err.into()),
    };
    state.config.set_user(&user.name)?;
    println!("User {} created", user.name);
    Ok(())
}

pub async fn reset(state: &mut AppState, _command: Command) -> Result<(), CliError> {
    let deleted = state.repository.delete_all_users().await?;
    println!("Deleted {deleted} users");
    Ok(())
}

pub async fn users(state: &mut AppState, _command: Command) -> Result<(), CliError> {
    for user in state.repository.list_users().await? {
        if user.name == state.config.current_user_name {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

pub async fn addfeed(state: &mut AppState, command: Command) -> Result<(), CliError> {
    let user = current_user(state).await?;
    let name = require_arg(&command, 0, "feedr addfeed <name> <url>")?;
    let url = require_arg(&command, 1, "feedr addfeed <name> <url>")?;
    let feed = match state
        .repository
        .create_feed(&NewFeed {
            name: name.to_string(),
            url: url.to_string(),
            user_id: user.id,
        })
        .await
    {
        Ok(feed) => feed,
        Err(err) if err.is_unique_violation() => {
            return Err(CliError::Message(format!(
                "a feed with url {url} already exists"
            )));
        }
        Err(err) => return Err(err.into()),
    };
    state.repository.create_feed_follow(user.id, feed.id).await?;
    println!("Feed {} added and followed", feed.name);
    Ok(())
}

pub async fn feeds(state: &mut AppState, _command: Command) -> Result<(), CliError> {
    for feed in state.repository.list_feeds_with_owners().await? {
        println!("* {} {} (added by {})", feed.name, feed.url, feed.owner_name);
    }
    Ok(())
}

pub async fn follow(state: &mut AppState, command: Command) -> Result<(), CliError> {
    let user = current_user(state).await?;
    let url = require_arg(&command, 0, "feedr follow <url>")?;
    let Some(feed) = state.repository.get_feed_by_url(url).await? else {
        return Err(CliError::Message(format!("no feed with url {url}")));
    };
    match state.repository.create_feed_follow(user.id, feed.id).await {
        Ok(_) => {
            println!("{} is now following {}", user.name, feed.name);
            Ok(())
        }
        Err(err) if err.is_unique_violation() => Err(CliError::Message(format!(
            "{} is already following {}",
            user.name, feed.name
        ))),
        Err(err) => Err(err.into()),
    }
}

pub async fn following(state: &mut AppState, _command: Command) -> Result<(), CliError> {
    let user = current_user(state).await?;
    let feeds = state.repository.list_followed_feeds(user.id).await?;
    if feeds.is_empty() {
        println!("Not following any feeds");
        return Ok(());
    }
    for feed in feeds {
        println!("* {}", feed.name);
    }
    Ok(())
}

pub async fn unfollow(state: &mut AppState, command: Command) -> Result<(), CliError> {
    let user = current_user(state).await?;
    let url = require_arg(&command, 0, "feedr unfollow <url>")?;
    let Some(feed) = state.repository.get_feed_by_url(url).await? else {
        return Err(CliError::Message(format!("no feed with url {url}")));
    };
    let removed = state.repository.delete_feed_follow(user.id, feed.id).await?;
    if removed == 0 {
        return Err(CliError::Message(format!(
            "{} was not following {}",
            user.name, feed.name
        )));
    }
    println!("Unfollowed {}", feed.name);
    Ok(())
}

pub async fn browse(state: &mut AppState, command: Command) -> Result<(), CliError> {
    let user = current_user(state).await?;
    let limit = match command.args.first() {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or(CliError::Usage("feedr browse [limit]"))?,
        None => 2,
    };
    for post in state.repository.list_posts_for_user(user.id, limit).await? {
        println!("{} ({})", post.title, post.feed_name);
        println!("  {}", post.url);
        if let Some(published_at) = &post.published_at {
            println!("  published {published_at}");
        }
        if let Some(description) = &post.description {
            println!("  {description}");
        }
    }
    Ok(())
}

/// Starts the ingestion loop; runs until the process is interrupted.
pub async fn agg(state: &mut AppState, command: Command) -> Result<(), CliError> {
    let raw = require_arg(&command, 0, "feedr agg <interval>")?;
    let interval = parse_interval(raw)?;
    let ingestor = Ingestor::new(state.repository.clone(), interval)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = stop_tx.send(true);
    });

    println!("Collecting feeds every {raw}");
    ingestor.run(stop_rx).await;
    Ok(())
}

async fn current_user(state: &AppState) -> Result<UserRecord, CliError> {
    let name = state.config.current_user_name.as_str();
    if name.is_empty() {
        return Err(CliError::NotLoggedIn);
    }
    state
        .repository
        .get_user_by_name(name)
        .await?
        .ok_or(CliError::NotLoggedIn)
}

fn require_arg<'a>(
    command: &'a Command,
    index: usize,
    usage: &'static str,
) -> Result<&'a str, CliError> {
    command
        .args
        .get(index)
        .map(String::as_str)
        .ok_or(CliError::Usage(usage))
}
