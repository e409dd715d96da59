//! Reference-number generator.
//!
//! Per-prefix sequences live in the stock state and are bumped inside the
//! unit of work, so a failed operation never consumes a number.

use stockbook_inventory::{DocumentKind, format_reference};

use crate::config::ReferenceConfig;
use crate::store::UnitOfWork;

/// Allocate the next reference code for `kind` (e.g. `ISS-000001`).
pub fn allocate(uow: &mut UnitOfWork<'_>, config: &ReferenceConfig, kind: DocumentKind) -> String {
    let prefix = config.prefix(kind);
    let sequence = uow.next_sequence(prefix);
    format_reference(prefix, sequence, config.width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::{InMemoryStockStore, StockStore, StockView};

    #[test]
    fn sequences_are_per_prefix_and_monotonic() {
        let store = InMemoryStockStore::new();
        let config = ReferenceConfig::default();
        let codes = store
            .transact(|uow| {
                Ok::<_, EngineError>(vec![
                    allocate(uow, &config, DocumentKind::Issue),
                    allocate(uow, &config, DocumentKind::Issue),
                    allocate(uow, &config, DocumentKind::Disposal),
                ])
            })
            .unwrap();
        assert_eq!(codes, vec!["ISS-000001", "ISS-000002", "WST-000001"]);

        let next = store
            .transact(|uow| Ok::<_, EngineError>(allocate(uow, &config, DocumentKind::Issue)))
            .unwrap();
        assert_eq!(next, "ISS-000003");
        assert_eq!(store.read(|s| s.last_sequence("ISS")).unwrap(), 3);
    }

    #[test]
    fn custom_prefix_and_width() {
        let store = InMemoryStockStore::new();
        let config = ReferenceConfig {
            width: 4,
            issue: "TRF".to_string(),
            ..ReferenceConfig::default()
        };
        let code = store
            .transact(|uow| Ok::<_, EngineError>(allocate(uow, &config, DocumentKind::Issue)))
            .unwrap();
        assert_eq!(code, "TRF-0001");
    }
}
