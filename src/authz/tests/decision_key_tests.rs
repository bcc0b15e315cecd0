//! Decision-key properties
//!
//! Any mix of targets resolves an id-keyed perm once per distinct canonical
//! id, whatever form the id arrives in.

use futures::executor::block_on;
use futures::future::join_all;
use lazyref_authz::{Approval, Approved, Perm};
use lazyref_core::{id_by, LookUp, Ref, Settled, TypeTag};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TICKET: TypeTag = TypeTag::new("Ticket");

#[derive(Debug, Clone)]
struct Ticket {
    id: i64,
}

#[derive(Debug, Clone)]
enum Form {
    Loaded,
    Lazy,
    Pending,
}

fn form() -> impl Strategy<Value = Form> {
    prop_oneof![Just(Form::Loaded), Just(Form::Lazy), Just(Form::Pending)]
}

fn counted_perm(calls: &Arc<AtomicUsize>) -> Perm<String, Ticket> {
    let calls = Arc::clone(calls);
    Perm::cache_on_id("close ticket", TICKET, id_by(|t: &Ticket| t.id), move |_, ticket| {
        calls.fetch_add(1, Ordering::SeqCst);
        ticket.map(|t| Approved::because(format!("ticket {}", t.id)))
    })
}

proptest! {
    #[test]
    fn prop_one_resolution_per_distinct_id(asks in prop::collection::vec((0i64..16, form()), 1..40)) {
        let calls = Arc::new(AtomicUsize::new(0));
        let perm = counted_perm(&calls);
        let tickets = LookUp::new("tickets", |id: i64| Ref::ready(Ticket { id }));
        let approval = Approval::new(Ref::ready("ops".to_string()));

        let decisions: Vec<Ref<Approved>> = asks
            .iter()
            .map(|(id, form)| match form {
                Form::Loaded => approval.ask(perm.on(Ref::ready(Ticket { id: *id }))),
                Form::Lazy => approval.ask(perm.on(&tickets.lazy(*id))),
                Form::Pending => {
                    let id = *id;
                    approval.ask(perm.on(Ref::pending(async move { Settled::Ready(Ticket { id }) })))
                }
            })
            .collect();

        let settled = block_on(join_all(decisions.into_iter().map(|d| d.settle())));

        for ((id, _), outcome) in asks.iter().zip(settled) {
            let expected = format!("ticket {}", id);
            prop_assert!(matches!(outcome, Settled::Ready(ref a) if a.reason.as_deref() == Some(expected.as_str())));
        }

        let distinct: HashSet<i64> = asks.iter().map(|(id, _)| *id).collect();
        prop_assert_eq!(calls.load(Ordering::SeqCst), distinct.len());
        prop_assert_eq!(approval.decision_count(), distinct.len());
    }

    #[test]
    fn prop_separate_approvals_never_share(id in any::<i64>(), approvals in 1usize..8) {
        let calls = Arc::new(AtomicUsize::new(0));
        let perm = counted_perm(&calls);

        for n in 0..approvals {
            let approval = Approval::new(Ref::ready(format!("user-{}", n)));
            let _ = approval.ask(perm.on(Ref::ready(Ticket { id })));
            let _ = approval.ask(perm.on(Ref::ready(Ticket { id })));
        }

        prop_assert_eq!(calls.load(Ordering::SeqCst), approvals);
    }
}
