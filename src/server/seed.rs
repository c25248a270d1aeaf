//! Demo data seeded on first run: the Barcelona planning trip.

use crate::model::{now_rfc3339, NewMessage, NewTrip, NewUser, OptionUpsert};
use crate::server::utils::new_invite_token;
use crate::storage::{Storage, StorageError};

pub const DEMO_TRIP_ID: &str = "BCN-2024-001";

/// Seed the demo trip on an empty database. Returns false when demo users
/// already exist (nothing written).
pub fn seed_demo_data(storage: &Storage) -> Result<bool, StorageError> {
    if storage.get_user_by_username("alice")?.is_some() {
        return Ok(false);
    }
    let now = now_rfc3339();

    let users = [
        ("alice", "Alice Johnson", "#3B82F6"),
        ("bob", "Bob Smith", "#10B981"),
        ("carol", "Carol Williams", "#8B5CF6"),
    ];
    let mut user_ids = Vec::with_capacity(users.len());
    for (username, display_name, color) in users {
        let user = storage.create_user(&NewUser {
            username: username.to_string(),
            display_name: display_name.to_string(),
            avatar: None,
            color: Some(color.to_string()),
            home_city: None,
        })?;
        user_ids.push(user.id);
    }

    let trip = storage.create_trip(
        &NewTrip {
            trip_id: DEMO_TRIP_ID.to_string(),
            title: "Barcelona Trip Planning".to_string(),
            destination: Some("Barcelona".to_string()),
            start_date: None,
            end_date: None,
            budget: Some(3600),
            state: Some("COLLECTING_DATES".to_string()),
            creator_id: None,
        },
        &new_invite_token(),
        &now,
    )?;

    for (i, user_id) in user_ids.iter().enumerate() {
        let role = if i == 0 { "organizer" } else { "traveler" };
        storage.add_participant(&trip.trip_id, *user_id, role, &now)?;
    }

    let messages = [
        NewMessage {
            user_id: None,
            kind: "system".to_string(),
            content: "Welcome to PackTrip AI! I'm your travel concierge. I'll help you plan the perfect Barcelona trip with your friends.".to_string(),
            metadata: Some(serde_json::json!({ "tripId": DEMO_TRIP_ID })),
        },
        NewMessage {
            user_id: Some(user_ids[0]),
            kind: "user".to_string(),
            content: "Hey everyone! I'm thinking Barcelona in October, budget around €1200. What do you think? 🌟".to_string(),
            metadata: None,
        },
        NewMessage {
            user_id: Some(user_ids[1]),
            kind: "user".to_string(),
            content: "Perfect! October works for me. I'm flexible on dates but prefer mid-month. Budget looks good too! 👍".to_string(),
            metadata: None,
        },
        NewMessage {
            user_id: None,
            kind: "agent".to_string(),
            content: "Excellent! Barcelona in October is a fantastic choice. Now let's coordinate your dates - I need everyone to mark their availability on the calendar below. Click on the dates you're available to travel!".to_string(),
            metadata: None,
        },
    ];
    for message in &messages {
        storage.insert_message(&trip.trip_id, message, &now)?;
    }

    let options = [
        OptionUpsert {
            option_id: "culture-history".to_string(),
            kind: "itinerary".to_string(),
            title: "Culture & History Focus".to_string(),
            description: Some(
                "Gothic Quarter walks, Sagrada Familia, Picasso Museum, authentic tapas tours"
                    .to_string(),
            ),
            price: Some(1150),
            image: Some("https://images.unsplash.com/photo-1558642452-9d2a7deb7f62?ixlib=rb-4.0.3&ixid=MnwxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8&auto=format&fit=crop&w=800&h=200".to_string()),
            metadata: None,
        },
        OptionUpsert {
            option_id: "beach-nightlife".to_string(),
            kind: "itinerary".to_string(),
            title: "Beach & Nightlife".to_string(),
            description: Some(
                "Barceloneta Beach, rooftop bars, beach clubs, sunset sailing".to_string(),
            ),
            price: Some(1280),
            image: Some("https://images.unsplash.com/photo-1523531294919-4bcd7c65e216?ixlib=rb-4.0.3&ixid=MnwxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8&auto=format&fit=crop&w=800&h=200".to_string()),
            metadata: None,
        },
        OptionUpsert {
            option_id: "food-architecture".to_string(),
            kind: "itinerary".to_string(),
            title: "Food & Architecture".to_string(),
            description: Some(
                "Park Güell, cooking classes, food markets, Gaudí architecture tour".to_string(),
            ),
            price: Some(1200),
            image: Some("https://images.unsplash.com/photo-1539037116277-4db20889f2d4?ixlib=rb-4.0.3&ixid=MnwxMjA3fDB8MHxwaG90by1wYWdlfHx8fGVufDB8fHx8&auto=format&fit=crop&w=800&h=200".to_string()),
            metadata: None,
        },
    ];
    for option in &options {
        storage.upsert_option(&trip.trip_id, option, &now)?;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(seed_demo_data(&storage).unwrap());
        assert!(!seed_demo_data(&storage).unwrap());

        assert_eq!(storage.list_users().unwrap().len(), 3);
        assert_eq!(storage.list_trips().unwrap().len(), 1);

        let trip = storage.get_trip(DEMO_TRIP_ID).unwrap().unwrap();
        assert_eq!(trip.state, "COLLECTING_DATES");
        assert_eq!(trip.budget, Some(3600));

        let participants = storage.list_participants(DEMO_TRIP_ID).unwrap();
        assert_eq!(participants.len(), 3);
        let alice = participants
            .iter()
            .find(|p| p.user.as_ref().is_some_and(|u| u.username == "alice"))
            .unwrap();
        assert_eq!(alice.role, "organizer");

        assert_eq!(storage.list_messages(DEMO_TRIP_ID).unwrap().len(), 4);
        assert_eq!(storage.list_options(DEMO_TRIP_ID).unwrap().len(), 3);
    }
}
