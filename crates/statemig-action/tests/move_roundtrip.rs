use proptest::prelude::*;
use statemig_action::{Action, ActionExecutor};
use statemig_state::{InstanceKey, ModuleStep, ResourceAddress, ResourceRecord, StateSnapshot};

#[derive(Debug, Clone)]
struct Entry {
    module: Option<String>,
    type_name: &'static str,
    name: String,
    key: Option<u64>,
}

impl Entry {
    fn module_path(&self) -> Vec<ModuleStep> {
        self.module.iter().map(ModuleStep::new).collect()
    }

    fn instance(&self) -> ResourceAddress {
        ResourceAddress::managed(
            self.module_path(),
            self.type_name,
            self.name.clone(),
            self.key.map(InstanceKey::Index),
        )
    }
}

fn entry() -> impl Strategy<Value = Entry> {
    (
        proptest::option::of("[a-d]{1,3}"),
        prop_oneof![Just("aws_instance"), Just("aws_s3_bucket"), Just("google_sql_database")],
        "[a-m]{1,4}",
        proptest::option::of(0u64..3),
    )
        .prop_map(|(module, type_name, name, key)| Entry {
            module,
            type_name,
            name,
            key,
        })
}

fn state_of(entries: &[Entry]) -> StateSnapshot {
    entries.iter().enumerate().fold(
        StateSnapshot::with_lineage("prop"),
        |state, (i, e)| {
            state.with_resource(
                e.instance(),
                ResourceRecord::imported("provider[\"registry.terraform.io/hashicorp/aws\"]", format!("id-{i}")),
            )
        },
    )
}

fn round_trip(state: &StateSnapshot, a: ResourceAddress, b: ResourceAddress) -> StateSnapshot {
    let executor = ActionExecutor::new();
    let forward = Action::Move {
        source: a.clone(),
        destination: b.clone(),
    };
    let back = Action::Move {
        source: b,
        destination: a,
    };
    executor.replay(state.clone(), &[forward, back]).unwrap()
}

proptest! {
    #[test]
    fn prop_resource_move_round_trips(
        entries in proptest::collection::vec(entry(), 1..12),
        pick in any::<prop::sample::Index>(),
    ) {
        let state = state_of(&entries);
        let chosen = &entries[pick.index(entries.len())];
        let a = chosen.instance().with_key(None);
        let b = ResourceAddress::managed(
            vec![ModuleStep::new("zz_relocated")],
            chosen.type_name,
            "zz_moved",
            None,
        );

        let restored = round_trip(&state, a, b);
        prop_assert!(restored.same_resources(&state));
    }

    #[test]
    fn prop_module_move_round_trips(
        entries in proptest::collection::vec(entry(), 1..12),
        pick in any::<prop::sample::Index>(),
    ) {
        let state = state_of(&entries);
        let chosen = &entries[pick.index(entries.len())];
        prop_assume!(chosen.module.is_some());

        let a = ResourceAddress::module(chosen.module_path()).unwrap();
        let b = ResourceAddress::module(vec![ModuleStep::new("zz_moved")]).unwrap();

        let restored = round_trip(&state, a, b);
        prop_assert!(restored.same_resources(&state));
    }
}
