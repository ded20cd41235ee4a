//! Demo product catalog served by the binaries

use crate::models::CatalogEntry;

const PRODUCTS: &[(&str, &str, &str)] = &[
    (
        "1",
        "Wireless over-ear headphones with 30-hour battery life, noise-cancelling and foldable design.",
        "electronics",
    ),
    (
        "2",
        "Insulated stainless-steel water bottle, 750ml, keeps drinks cold for 24 hours and leakproof lid.",
        "kitchen",
    ),
    (
        "3",
        "Smart bedside lamp with warm-to-cool white spectrum, app-controlled scenes and sunrise alarm.",
        "home_electronics",
    ),
    (
        "4",
        "Eco-friendly bamboo cutting board set with non-slip feet and built-in juice groove.",
        "kitchen",
    ),
    (
        "5",
        "Compact portable charger (20,000 mAh) with dual USB-C ports and fast-charge support for phones and tablets.",
        "accessories",
    ),
    (
        "6",
        "Handmade vegan soy candle, autumn spice scent, poured in a reusable glass jar.",
        "home",
    ),
    (
        "7",
        "Cozy plush toy fox for toddlers, machine-washable with embroidered eyes and soft organic cotton.",
        "kids",
    ),
    (
        "8",
        "Deluxe watercolor travel set with 24 pigments, refillable water brush, and magnetic mixing tray.",
        "art_supplies",
    ),
    (
        "9",
        "Ergonomic memory-foam seat cushion that relieves lower back pressure and fits most office chairs.",
        "office",
    ),
    (
        "10",
        "Board game for 2-6 players, cooperative mystery-solving with modular board and replayable scenarios.",
        "games",
    ),
    (
        "11",
        "Organic herbal tea sampler: four blends in compostable sachets, calming and caffeine-free.",
        "grocery",
    ),
    (
        "12",
        "Minimalist RFID-blocking wallet in vegetable-tanned leather with six card slots and a slim profile.",
        "accessories",
    ),
];

/// Twelve products, each tagged with a category under `meta.tag`.
pub fn default_catalog() -> Vec<CatalogEntry> {
    PRODUCTS
        .iter()
        .map(|(id, text, tag)| CatalogEntry::new(*id, *text).with_meta("tag", *tag))
        .collect()
}
