//! Registration protocol properties, checked against every store backend.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use idpstat::{IdpFrequency, StatError, StatService, StatStore, TicketRejection};
use idpstat_storage::{MemoryStatStore, SqliteStatStore};
use proptest::prelude::*;
use tokio::task::JoinSet;

const SP: &str = "https://sp.example.org";
const IDP_A: &str = "https://a.example.org";
const IDP_B: &str = "https://b.example.org";

fn memory_service() -> StatService {
    StatService::new(Arc::new(MemoryStatStore::new()))
}

fn sqlite_service() -> StatService {
    let store: Arc<dyn StatStore> = Arc::new(SqliteStatStore::in_memory().unwrap());
    StatService::new(store)
}

fn is_unknown_ticket(result: &idpstat::Result<()>) -> bool {
    matches!(result, Err(StatError::InvalidTicket { reason: TicketRejection::Unknown }))
}

// ---------------------------------------------------------------------------
// Properties, generic over the store behind the service
// ---------------------------------------------------------------------------

async fn first_registration_counts_one(service: StatService) {
    let ticket = service.create_ticket().await.unwrap();
    service.register_call(SP, IDP_A, &ticket).await.unwrap();

    assert_eq!(service.get_stat(SP).await.unwrap(), vec![IdpFrequency::new(IDP_A, 1)]);
    assert!(service.get_all_sp().await.unwrap().contains(SP));
}

async fn ticket_is_single_use(service: StatService) {
    let ticket = service.create_ticket().await.unwrap();
    service.register_call(SP, IDP_A, &ticket).await.unwrap();

    assert!(is_unknown_ticket(&service.register_call(SP, IDP_A, &ticket).await));
    // A second SP cannot reuse it either.
    assert!(is_unknown_ticket(&service.register_call("https://other.example.org", IDP_A, &ticket).await));
    assert_eq!(service.get_stat(SP).await.unwrap()[0].frequency, 1);
}

async fn concurrent_redemption_has_one_winner(service: StatService) {
    const ATTEMPTS: usize = 32;
    let ticket = service.create_ticket().await.unwrap();

    let mut set = JoinSet::new();
    for _ in 0..ATTEMPTS {
        let service = service.clone();
        let ticket = ticket.clone();
        set.spawn(async move { service.register_call(SP, IDP_A, &ticket).await });
    }

    let mut accepted = 0;
    let mut rejected = 0;
    while let Some(joined) = set.join_next().await {
        let result = joined.expect("task panicked");
        if result.is_ok() {
            accepted += 1;
        } else {
            assert!(is_unknown_ticket(&result), "unexpected error: {result:?}");
            rejected += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(rejected, ATTEMPTS - 1);
    assert_eq!(service.get_stat(SP).await.unwrap(), vec![IdpFrequency::new(IDP_A, 1)]);
}

async fn repeated_registrations_accumulate(service: StatService) {
    for _ in 0..5 {
        let ticket = service.create_ticket().await.unwrap();
        service.register_call(SP, IDP_A, &ticket).await.unwrap();
    }
    assert_eq!(service.get_stat(SP).await.unwrap(), vec![IdpFrequency::new(IDP_A, 5)]);
}

async fn stats_ordered_most_frequent_first(service: StatService) {
    for idp in [IDP_A, IDP_B, IDP_B, IDP_B] {
        let ticket = service.create_ticket().await.unwrap();
        service.register_call(SP, idp, &ticket).await.unwrap();
    }
    assert_eq!(
        service.get_stat(SP).await.unwrap(),
        vec![IdpFrequency::new(IDP_B, 3), IdpFrequency::new(IDP_A, 1)]
    );
}

async fn unknown_sp_has_no_stats(service: StatService) {
    assert!(service.get_stat("https://never.example.org").await.unwrap().is_empty());
    assert!(service.get_all_sp().await.unwrap().is_empty());
}

async fn empty_sp_rejects_without_consuming(service: StatService) {
    let ticket = service.create_ticket().await.unwrap();

    let result = service.register_call("", IDP_A, &ticket).await;
    assert!(matches!(result, Err(StatError::Validation { ref field, .. }) if field == "sp"));
    let result = service.register_call(SP, "", &ticket).await;
    assert!(matches!(result, Err(StatError::Validation { ref field, .. }) if field == "idp"));

    assert_eq!(service.outstanding_tickets().await.unwrap(), 1);
    service.register_call(SP, IDP_A, &ticket).await.unwrap();
}

async fn forged_ticket_counts_nothing(service: StatService) {
    service.create_ticket().await.unwrap();
    assert!(is_unknown_ticket(&service.register_call(SP, IDP_A, "forged").await));
    assert!(service.get_all_sp().await.unwrap().is_empty());
    assert_eq!(service.outstanding_tickets().await.unwrap(), 1);
}

async fn all_sp_lists_each_sp_once(service: StatService) {
    for sp in ["https://x.example.org", "https://y.example.org", "https://x.example.org"] {
        let ticket = service.create_ticket().await.unwrap();
        service.register_call(sp, IDP_A, &ticket).await.unwrap();
    }
    let all: Vec<String> = service.get_all_sp().await.unwrap().into_iter().collect();
    assert_eq!(all, vec!["https://x.example.org", "https://y.example.org"]);
}

macro_rules! registration_tests {
    ($make:expr) => {
        #[tokio::test]
        async fn first_registration_counts_one() {
            super::first_registration_counts_one($make).await;
        }

        #[tokio::test]
        async fn ticket_is_single_use() {
            super::ticket_is_single_use($make).await;
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn concurrent_redemption_has_one_winner() {
            super::concurrent_redemption_has_one_winner($make).await;
        }

        #[tokio::test]
        async fn repeated_registrations_accumulate() {
            super::repeated_registrations_accumulate($make).await;
        }

        #[tokio::test]
        async fn stats_ordered_most_frequent_first() {
            super::stats_ordered_most_frequent_first($make).await;
        }

        #[tokio::test]
        async fn unknown_sp_has_no_stats() {
            super::unknown_sp_has_no_stats($make).await;
        }

        #[tokio::test]
        async fn empty_sp_rejects_without_consuming() {
            super::empty_sp_rejects_without_consuming($make).await;
        }

        #[tokio::test]
        async fn forged_ticket_counts_nothing() {
            super::forged_ticket_counts_nothing($make).await;
        }

        #[tokio::test]
        async fn all_sp_lists_each_sp_once() {
            super::all_sp_lists_each_sp_once($make).await;
        }
    };
}

mod memory {
    registration_tests!(super::memory_service());
}

mod sqlite {
    registration_tests!(super::sqlite_service());
}

// ---------------------------------------------------------------------------
// Aggregation property
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Each IdP's frequency equals the number of successful registrations
    /// naming it, and the list is sorted by frequency then name.
    #[test]
    fn prop_frequencies_match_registrations(choices in proptest::collection::vec(0usize..4, 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let idps = ["idp-a", "idp-b", "idp-c", "idp-d"];

        let stats = runtime.block_on(async {
            let service = memory_service();
            for &choice in &choices {
                let ticket = service.create_ticket().await.unwrap();
                service.register_call(SP, idps[choice], &ticket).await.unwrap();
            }
            service.get_stat(SP).await.unwrap()
        });

        for (idx, idp) in idps.iter().enumerate() {
            let expected = choices.iter().filter(|&&c| c == idx).count() as u64;
            let actual = stats.iter().find(|s| s.idp == *idp).map_or(0, |s| s.frequency);
            prop_assert_eq!(actual, expected, "frequency of {}", idp);
        }
        prop_assert!(stats.iter().all(|s| s.frequency > 0));
        let ordered = stats.windows(2).all(|w| {
            w[0].frequency > w[1].frequency
                || (w[0].frequency == w[1].frequency && w[0].idp < w[1].idp)
        });
        prop_assert!(ordered, "not ordered by frequency then name: {:?}", stats);
    }
}
