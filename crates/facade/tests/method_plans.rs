use gnn_privacy::core::Component;
use gnn_privacy::{
    auto_delta, CalibrationRecord, Delta, DpLevel, Graph, GraphStats, MethodPlan, NoisyMechanism,
    Perturbation, PrivacyConfig, PrivacyMethod,
};

fn grid(side: usize) -> Graph {
    let id = |r: usize, c: usize| r * side + c;
    let mut pairs = Vec::new();
    for r in 0..side {
        for c in 0..side {
            if c + 1 < side {
                pairs.push((id(r, c), id(r, c + 1)));
            }
            if r + 1 < side {
                pairs.push((id(r, c), id(r + 1, c)));
            }
        }
    }
    Graph::from_undirected(side * side, pairs).expect("graph")
}

fn stats() -> GraphStats {
    GraphStats::from_graph(&grid(30), 600)
}

#[test]
fn unbounded_budget_needs_no_noise() {
    let plan = MethodPlan::build(PrivacyMethod::GapEdp, PrivacyConfig::default(), stats())
        .expect("plan")
        .calibrate()
        .expect("calibrate");
    assert_eq!(plan.delta(), 0.0);
    assert_eq!(plan.noise_scale(), 0.0);
    assert_eq!(plan.record().target_epsilon, None);
    assert_eq!(plan.pma().map(|p| p.noise_scale()), Some(0.0));
}

#[test]
fn gap_edge_level_calibrates_aggregation_noise() {
    let stats = stats();
    let config = PrivacyConfig::default().with_budget(2.0, Delta::Auto);
    let plan = MethodPlan::build(PrivacyMethod::GapEdp, config, stats)
        .expect("plan")
        .calibrate()
        .expect("calibrate");

    assert_eq!(plan.delta(), auto_delta(stats.num_edges));
    assert!(plan.noise_scale() > 0.0);
    assert!(plan.epsilon() <= 2.0);
    let pma = plan.pma().expect("pma");
    assert_eq!(pma.noise_scale(), plan.noise_scale());
    assert_eq!(pma.hops(), 2);
    assert_eq!(plan.aggregation_sensitivity(), 1.0);
    assert!(plan.neighbor_sampler().expect("sampler").is_none());
    assert!(plan.graph_filter().is_none());

    let json = plan.record().to_json().expect("json");
    let record = CalibrationRecord::from_json(&json).expect("record");
    assert_eq!(record.noise_scale, plan.noise_scale());
    assert_eq!(record.target_epsilon, Some(2.0));
}

#[test]
fn gap_graph_perturbation_moves_noise_to_the_structure() {
    let graph = grid(12);
    let stats = GraphStats::from_graph(&graph, 0);
    let config = PrivacyConfig::default()
        .with_perturbation(Perturbation::Graph)
        .with_budget(3.0, Delta::Fixed(1e-4))
        .with_seed(5);
    let plan = MethodPlan::build(PrivacyMethod::GapEdp, config, stats)
        .expect("plan")
        .calibrate()
        .expect("calibrate");

    let filter = plan.graph_filter().expect("filter");
    assert!(filter.noise_scale() > 0.0);
    assert_eq!(plan.pma().map(|p| p.noise_scale()), Some(0.0));

    let mut rng = plan.seed().stream(Component::GraphPerturbation);
    let perturbed = filter.apply(&graph, &mut rng).expect("perturb");
    assert_eq!(perturbed.num_nodes(), graph.num_nodes());
}

#[test]
fn gap_node_level_shares_one_scale_across_stages() {
    let config = PrivacyConfig::default()
        .with_batch_size(64)
        .with_max_degree(16)
        .with_epochs(20, 30)
        .with_budget(8.0, Delta::Auto);
    let plan = MethodPlan::build(PrivacyMethod::GapNdp, config, stats())
        .expect("plan")
        .calibrate()
        .expect("calibrate");

    assert_eq!(plan.config().dp_level, DpLevel::Node);
    assert_eq!(plan.delta(), auto_delta(600));
    let scale = plan.noise_scale();
    let encoder = plan.encoder_sgd().expect("encoder");
    let classifier = plan.classifier_sgd().expect("classifier");
    assert_eq!(encoder.noise_scale(), scale);
    assert_eq!(classifier.noise_scale(), scale);
    assert_eq!(plan.pma().expect("pma").noise_scale(), scale);
    assert_eq!(encoder.epochs(), 20);
    assert_eq!(classifier.epochs(), 30);
    assert_eq!(encoder.dataset_size(), 600);

    assert_eq!(plan.aggregation_sensitivity(), 4.0);
    assert_eq!(
        plan.neighbor_sampler()
            .expect("sampler")
            .map(|s| s.max_degree()),
        Some(16)
    );
    assert!(plan.epsilon() <= 8.0);
}

#[test]
fn sage_plans() {
    let edge = MethodPlan::build(
        PrivacyMethod::SageEdp,
        PrivacyConfig::default().with_budget(4.0, Delta::Auto),
        stats(),
    )
    .expect("plan")
    .calibrate()
    .expect("calibrate");
    assert!(edge.graph_filter().is_some());
    assert!(edge.pma().is_none());

    let node = MethodPlan::build(
        PrivacyMethod::SageNdp,
        PrivacyConfig::default()
            .with_batch_size(60)
            .with_max_degree(5)
            .with_epochs(0, 5)
            .with_budget(8.0, Delta::Auto),
        stats(),
    )
    .expect("plan")
    .calibrate()
    .expect("calibrate");
    let gnn = node.gnn_sgd().expect("gnn sgd");
    assert_eq!(gnn.noise_scale(), node.noise_scale());
    assert_eq!(gnn.max_degree(), 5);
    assert!(node.neighbor_sampler().expect("sampler").is_some());
}

#[test]
fn mlp_plan_is_plain_dpsgd() {
    let plan = MethodPlan::build(
        PrivacyMethod::MlpDp,
        PrivacyConfig::default()
            .with_batch_size(50)
            .with_budget(1.0, Delta::Fixed(1e-5)),
        stats(),
    )
    .expect("plan")
    .calibrate()
    .expect("calibrate");
    assert!(plan.classifier_sgd().is_some());
    assert!(plan.encoder_sgd().is_none());
    assert!(plan.neighbor_sampler().expect("sampler").is_none());
    assert!(plan.epsilon() <= 1.0);
}

#[test]
fn node_level_requires_minibatches() {
    let err = MethodPlan::build(PrivacyMethod::GapNdp, PrivacyConfig::default(), stats())
        .expect_err("full batch is not allowed");
    assert!(!err.is_calibration());
}

#[test]
fn zero_delta_with_finite_budget_is_infeasible() {
    let config = PrivacyConfig::default().with_budget(1.0, Delta::Fixed(0.0));
    let err = MethodPlan::build(PrivacyMethod::GapEdp, config, stats())
        .expect("plan")
        .calibrate()
        .expect_err("infeasible");
    assert!(err.is_calibration());
}

#[test]
fn larger_training_set_needs_less_noise() {
    let config = PrivacyConfig::default()
        .with_batch_size(100)
        .with_epochs(0, 10)
        .with_budget(2.0, Delta::Fixed(1e-5));
    let calibrate = |train_nodes| {
        let stats = GraphStats {
            num_train_nodes: train_nodes,
            ..stats()
        };
        MethodPlan::build(PrivacyMethod::MlpDp, config.clone(), stats)
            .expect("plan")
            .calibrate()
            .expect("calibrate")
            .noise_scale()
    };
    assert!(calibrate(10_000) < calibrate(1_000));
}
