use std::collections::HashMap;

use reserva_core::models::{LineItemDraft, Package, ServiceSelection};
use reserva_core::BookingError;
use uuid::Uuid;

/// Resolves a package definition into line-item drafts: exactly one draft
/// per distinct service, in definition order, quantities merged.
///
/// The write-time `(booking_id, service_id)` uniqueness constraint backs
/// this up, so a regression here surfaces as a constraint violation rather
/// than silently duplicated rows.
pub fn resolve_line_items(package: &Package) -> Result<Vec<LineItemDraft>, BookingError> {
    if package.services.is_empty() {
        return Err(BookingError::InvalidPackage(format!(
            "package '{}' resolves to no services",
            package.name
        )));
    }

    let entries: Vec<(Uuid, String, i32, i32)> = package
        .services
        .iter()
        .map(|s| (s.service_id, s.name.clone(), s.quantity, s.unit_price_cents))
        .collect();

    merge_entries(&package.name, entries)
}

/// Resolves an explicit service list the same way a package is resolved.
pub fn resolve_service_selection(
    services: &[ServiceSelection],
) -> Result<Vec<LineItemDraft>, BookingError> {
    if services.is_empty() {
        return Err(BookingError::InvalidPackage(
            "no services selected".to_string(),
        ));
    }

    let entries: Vec<(Uuid, String, i32, i32)> = services
        .iter()
        .map(|s| (s.service_id, s.name.clone(), s.quantity, s.unit_price_cents))
        .collect();

    merge_entries("selection", entries)
}

fn merge_entries(
    source: &str,
    entries: Vec<(Uuid, String, i32, i32)>,
) -> Result<Vec<LineItemDraft>, BookingError> {
    let mut drafts: Vec<LineItemDraft> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for (service_id, name, quantity, unit_price_cents) in entries {
        if quantity <= 0 {
            return Err(BookingError::InvalidPackage(format!(
                "service '{}' in {} has non-positive quantity {}",
                name, source, quantity
            )));
        }

        match index.get(&service_id) {
            // Repeated service rows collapse into one entry. First
            // occurrence fixes position and price.
            Some(&i) => drafts[i].quantity += quantity,
            None => {
                index.insert(service_id, drafts.len());
                drafts.push(LineItemDraft {
                    service_id,
                    name,
                    quantity,
                    unit_price_cents,
                });
            }
        }
    }

    Ok(drafts)
}
