use proptest::prelude::*;
use tensegrity_core::energy::compute_structural_potential;
use tensegrity_core::{Edge, EngineParams, FieldStore, GraphModel, NodeFields};
use tensegrity_sim::{
    incident_probability, ActorSpec, Event, NodeSpec, RunExport, Scenario, ScenarioId,
    ScenarioRunner, SeedStreams, Simulation, SimulationState,
};

fn square() -> Scenario {
    Scenario {
        name: "square".into(),
        nodes: vec![
            NodeSpec::new("a", 0.6, 0.5, 0.3, 0.7),
            NodeSpec::new("b", 0.9, 0.2, 0.1, 0.4),
            NodeSpec::new("c", 0.4, 0.8, 0.6, 0.9),
            NodeSpec::new("d", 1.0, 0.0, 0.0, 0.0),
        ],
        edges: vec![
            Edge::new("a", "b", 0.5),
            Edge::new("b", "c", 0.8),
            Edge::new("c", "d", 0.3),
        ],
        actors: vec![ActorSpec::feature_engineer("f"), ActorSpec::ai_agent("bot")],
        schedule: Vec::new(),
        governance: Vec::new(),
        params: None,
        n_steps: 20,
        seed: 1,
        health_decay_rate: 0.0,
        enable_incidents: true,
    }
}

fn node() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "ghost"]).prop_map(String::from)
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        node().prop_map(|n| Event::feature_change(n)),
        node().prop_map(|n| Event::refactor(n)),
        node().prop_map(|n| Event::patch(n)),
        (node(), node(), 0.01f64..2.0).prop_map(|(a, b, weight)| Event::AddEdge {
            a: a.into(),
            b: b.into(),
            weight
        }),
        (node(), node()).prop_map(|(a, b)| Event::remove_edge(a, b)),
        node().prop_map(|n| Event::add_constraint(n)),
        (node(), -2.0f64..2.0).prop_map(|(n, d)| Event::demand_shock(n, d)),
        (0.0f64..1.0).prop_map(|rate| Event::HealthDecay { node: None, rate }),
        (-1.0f64..2.0, -1.0f64..2.0, node()).prop_map(|(h, c, n)| Event::NewRequirement {
            id: "e".into(),
            demand: c,
            health: h,
            complexity: c,
            risk: h,
            edges: vec![(n.into(), 0.5)],
        }),
    ]
}

fn snapshot(state: &SimulationState) -> (Vec<f64>, Vec<Edge>) {
    (state.fields().all_values().collect(), state.graph().edges())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fields_stay_in_unit_interval(events in prop::collection::vec(event(), 1..40)) {
        let mut state = square().build_state(SeedStreams::new(1), true).unwrap();
        for event in &events {
            let before = snapshot(&state);
            if state.apply_event(event).is_err() {
                prop_assert_eq!(snapshot(&state), before);
            }
            prop_assert!(state.fields().all_values().all(|v| (0.0..=1.0).contains(&v)));
            prop_assert!(state.fields().badness().iter().all(|b| (0.0..=1.0).contains(b)));
            let v_struct = compute_structural_potential(state.graph(), state.fields().badness());
            prop_assert!(v_struct >= 0.0);
        }
    }

    #[test]
    fn kinetic_energy_zero_at_first_step(seed in any::<u64>()) {
        let scenario = ScenarioId::Baseline.build().with_seed(seed).with_steps(3);
        let mut sim = Simulation::from_scenario(&scenario).unwrap();
        let log = sim.run().unwrap();
        prop_assert_eq!(log.records[0].t, 0.0);
        prop_assert!(log.records.iter().all(|r| r.t >= 0.0 && r.v_struct >= 0.0));
    }

    #[test]
    fn incident_probability_monotone(r1 in 0.0f64..=1.0, r2 in 0.0f64..=1.0, d in 0.0f64..=1.0) {
        let (lo, hi) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };
        prop_assert!(incident_probability(lo, d) <= incident_probability(hi, d));
        prop_assert!(incident_probability(d, lo) <= incident_probability(d, hi));
        prop_assert!((0.0..=1.0).contains(&incident_probability(hi, d)));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn same_seed_same_json(seed in any::<u64>()) {
        let scenario = ScenarioId::DemandSurge.build().with_seed(seed).with_steps(25);
        let render = || {
            let mut sim = Simulation::from_scenario(&scenario).unwrap();
            sim.run().unwrap();
            RunExport::new(&scenario.name, seed, scenario.n_steps, sim.into_log())
                .to_json()
                .unwrap()
        };
        prop_assert_eq!(render(), render());
    }

    #[test]
    fn hub_protection_never_hurts(seed in any::<u64>()) {
        let comparison = ScenarioRunner::new(seed)
            .compare_governance(&ScenarioId::HubStress.build())
            .unwrap();
        prop_assert!(comparison.governed.summary.max_h <= comparison.ungoverned.summary.max_h);
        let (governed, ungoverned) = (&comparison.governed.summary, &comparison.ungoverned.summary);
        prop_assert!(governed.total_incidents <= ungoverned.total_incidents);
    }
}

#[test]
fn path_example() {
    let graph = GraphModel::with_edges(
        ["A", "B", "C"],
        &[Edge::new("A", "B", 0.5), Edge::new("B", "C", 0.5)],
    )
    .unwrap();
    let mut fields = FieldStore::from_values(
        EngineParams::default(),
        vec![
            NodeFields::new(0.9, 0.0, 0.0, 0.0),
            NodeFields::new(0.5, 0.0, 0.0, 0.0),
            NodeFields::new(0.9, 0.0, 0.0, 0.0),
        ],
    );
    fields.recompute_derived(&graph).unwrap();

    let bad = fields.badness();
    approx::assert_abs_diff_eq!(bad[0], 0.04, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(bad[1], 0.2, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(bad[2], 0.04, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(compute_structural_potential(&graph, bad), 0.0128, epsilon = 1e-12);
}
