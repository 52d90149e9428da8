//! Inspect the local feed store.

use vidfeed_common::config::AppConfig;
use vidfeed_feed_model::feed::FeedPost;
use vidfeed_feed_store::{delete_record, get_records, JsonFileStore};

pub fn run(config: &AppConfig, delete: Option<String>) -> anyhow::Result<()> {
    let store = JsonFileStore::open(&config.store_dir)?;

    if let Some(id) = delete {
        if delete_record::<FeedPost>(&store, &id)? {
            println!("Deleted post {id}");
        } else {
            println!("No post with id {id}");
        }
        return Ok(());
    }

    let mut posts: Vec<FeedPost> = get_records(&store)?;
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    println!("Store: {}", store.root().display());
    if posts.is_empty() {
        println!("  (no posts)");
    }
    for post in posts {
        println!(
            "  {}  {:?}  {}  {}",
            post.id,
            post.status,
            post.created_at.format("%Y-%m-%d %H:%M"),
            post.prompt
        );
        if let Some(uri) = &post.video_uri {
            println!("      {uri}");
        }
    }
    Ok(())
}
