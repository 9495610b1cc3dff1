//! `wa.me` deep links that open a chat with a ride's creator.

use time::{format_description::BorrowedFormatItem, macros::format_description};

use crate::state::Ride;

/// `Friday, January 10, 2025`
const LONG_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[weekday], [month repr:long] [day padding:none], [year]");

/// Greeting pre-filled in the chat.
pub fn greeting(ride: &Ride) -> String {
    let date = ride
        .date
        .format(LONG_DATE)
        .unwrap_or_else(|_| ride.date.to_string());
    format!(
        "Hi! I joined your ride from {} to {} on {}.",
        ride.source, ride.destination, date
    )
}

/// Link to the creator's chat, or `None` when they did not share a number.
pub fn chat_link(ride: &Ride) -> Option<String> {
    let digits = ride
        .creator_whatsapp
        .as_deref()
        .map(|number| number.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|digits| !digits.is_empty())?;
    Some(format!(
        "https://wa.me/{digits}?text={}",
        urlencoding::encode(&greeting(ride))
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};
    use uuid::Uuid;

    fn ride(whatsapp: Option<&str>) -> Ride {
        Ride {
            id: Uuid::nil(),
            source: "Mumbai".into(),
            destination: "Pune".into(),
            date: date!(2025 - 01 - 10),
            start_time: time!(09:00),
            end_time: time!(10:00),
            total_seats: 2,
            seats_available: 2,
            creator_id: Uuid::nil(),
            creator_name: "A".into(),
            creator_email: "a@vitstudent.ac.in".into(),
            creator_whatsapp: whatsapp.map(str::to_string),
            created_at: datetime!(2025-01-01 08:00 UTC),
        }
    }

    #[test]
    fn greeting_spells_out_the_date() {
        assert_eq!(
            greeting(&ride(None)),
            "Hi! I joined your ride from Mumbai to Pune on Friday, January 10, 2025."
        );
    }

    #[test]
    fn link_encodes_the_greeting() {
        let link = chat_link(&ride(Some("919876543210"))).unwrap();
        assert_eq!(
            link,
            "https://wa.me/919876543210?text=Hi%21%20I%20joined%20your%20ride%20from%20Mumbai%20to%20Pune%20on%20Friday%2C%20January%2010%2C%202025."
        );
    }

    #[test]
    fn no_number_means_no_link() {
        assert_eq!(chat_link(&ride(None)), None);
        assert_eq!(chat_link(&ride(Some(""))), None);
    }
}
