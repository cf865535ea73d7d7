//! Builders for the domain records used across tests.
//!
//! Every record is timestamped with [`test_clock`](crate::test_clock) so
//! results are deterministic.

use crate::mocks::test_clock;
use plotbook_core::environment::Clock;
use plotbook_core::types::{
    AreaUnit, Block, BlockRowId, Booking, BookingId, BookingStatus, BuyerContact, Message, MessageId,
    PaymentStatus, PriceType, Property, PropertyId, UserId,
};
use rust_decimal::Decimal;

/// A bookable property priced at 5,000,000 with no blocks.
#[must_use]
pub fn property(owner: UserId, id: &str) -> Property {
    let now = test_clock().now();
    Property {
        id: PropertyId::new(id),
        owner_id: owner,
        title: "Riverside residential layout".to_string(),
        description: "DTCP approved plots with clear title".to_string(),
        location: "Near Bypass Road".to_string(),
        district: "Tiruchirappalli".to_string(),
        price: Some(Decimal::from(5_000_000)),
        price_type: PriceType::Total,
        is_available: true,
        is_featured: false,
        images: Vec::new(),
        amenities: vec!["Water".to_string(), "Road access".to_string()],
        size_sqft: Some(2400),
        bedrooms: None,
        bathrooms: None,
        coordinates: None,
        created_at: now,
        updated_at: now,
    }
}

/// A block of `total` free plots of 1200 sqft at 2500 per sqft (3,000,000 per plot).
#[must_use]
pub fn block(property_id: &PropertyId, label: &str, total: u32) -> Block {
    Block {
        id: BlockRowId::new(),
        property_id: property_id.clone(),
        block_id: label.to_string(),
        block_name: format!("Block {label}"),
        total_plots: total,
        available_plots: total,
        area_per_plot: Decimal::from(1200),
        area_unit: AreaUnit::Sqft,
        price_per_unit: Decimal::from(2500),
        total_price_per_plot: None,
    }
}

/// Complete buyer contact details.
#[must_use]
pub fn buyer() -> BuyerContact {
    BuyerContact {
        name: "Asha Raman".to_string(),
        phone: "+91 98765 43210".to_string(),
        email: Some("asha@example.com".to_string()),
        address: None,
        user_id: None,
    }
}

/// A pending booking.
#[must_use]
pub fn booking(property_id: &PropertyId, block: Option<BlockRowId>) -> Booking {
    Booking {
        id: BookingId::new(),
        property_id: property_id.clone(),
        block_id: block,
        buyer: buyer(),
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        total_price: Decimal::from(3_000_000),
        notes: None,
        created_at: test_clock().now(),
    }
}

/// A message sent at the test clock's time.
#[must_use]
pub fn message(sender: UserId, receiver: UserId, property_id: &PropertyId, content: &str) -> Message {
    Message {
        id: MessageId::new(),
        sender_id: sender,
        receiver_id: receiver,
        property_id: property_id.clone(),
        content: content.to_string(),
        created_at: test_clock().now(),
    }
}
