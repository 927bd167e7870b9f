//! Built-in demo dataset used to initialize an empty or corrupt cache.

use crate::model::{Comment, ImageKind, Post, User};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

fn user(id: &str, name: &str, username: &str, avatar_url: &str) -> User {
    User {
        id: id.into(),
        name: name.into(),
        username: username.into(),
        avatar_url: avatar_url.into(),
    }
}

fn comment(id: &str, username: &str, text: &str, created_at: i64) -> Comment {
    Comment {
        id: id.into(),
        author_id: format!("user_{username}"),
        author_username: username.into(),
        text: text.into(),
        created_at,
    }
}

/// The seed posts, timestamped relative to `now` so they render as
/// `2h`, `4h` and `6h` right after seeding.
pub fn seed_posts(now: i64) -> Vec<Post> {
    vec![
        Post {
            id: "1".into(),
            author: user(
                "user_sarahjcooks",
                "Sarah Johnson",
                "sarahjcooks",
                "https://images.unsplash.com/photo-1494790108755-2616b612b786?w=150&h=150&fit=crop&crop=face",
            ),
            image_data: "https://images.unsplash.com/photo-1565299624946-b28f40a0ca4b?w=400&h=400&fit=crop".into(),
            image_kind: ImageKind::Url,
            caption: "Just made this amazing homemade pizza! The secret is in the dough - let it rise for at least 24 hours. Recipe in my bio! 🍕✨ #homemadepizza #cooking #foodie".into(),
            like_count: 1247,
            liked_by_current_user: false,
            saved_by_current_user: false,
            comments: vec![
                comment("1-1", "foodlover123", "This looks absolutely delicious! 😍", now - HOUR_MS),
                comment("1-2", "healthyeats", "Can you share the recipe please?", now - 45 * MINUTE_MS),
                comment("1-3", "cookingninja", "Amazing presentation! 👏", now - 30 * MINUTE_MS),
            ],
            created_at: now - 2 * HOUR_MS,
        },
        Post {
            id: "2".into(),
            author: user(
                "user_chefmarcus_official",
                "Chef Marcus",
                "chefmarcus_official",
                "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=150&h=150&fit=crop&crop=face",
            ),
            image_data: "https://images.unsplash.com/photo-1546793665-c74683f339c1?w=400&h=400&fit=crop".into(),
            image_kind: ImageKind::Url,
            caption: "Salad doesn't have to be boring! This Mediterranean quinoa bowl is packed with flavors and nutrients. Perfect for meal prep too! 🥗💚".into(),
            like_count: 892,
            liked_by_current_user: true,
            saved_by_current_user: true,
            comments: Vec::new(),
            created_at: now - 4 * HOUR_MS,
        },
        Post {
            id: "3".into(),
            author: user(
                "user_emmawellness",
                "Emma Wellness",
                "emmawellness",
                "https://images.unsplash.com/photo-1438761681033-6461ffad8d80?w=150&h=150&fit=crop&crop=face",
            ),
            image_data: "https://images.unsplash.com/photo-1551024506-0bccd828d307?w=400&h=400&fit=crop".into(),
            image_kind: ImageKind::Url,
            caption: "Sunday pancake vibes! These fluffy beauties are made with oat flour and topped with fresh berries. Who else is having a cozy morning? 🥞☀️".into(),
            like_count: 2156,
            liked_by_current_user: false,
            saved_by_current_user: false,
            comments: Vec::new(),
            created_at: now - 6 * HOUR_MS,
        },
    ]
}
