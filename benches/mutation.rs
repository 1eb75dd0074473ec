//! Benchmarks for structural mutation, selection and evaluation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use modular_evo::{
    evolution::{Evaluator, SurrogateEvaluator, pareto_selection, remove_tournament},
    robot::{GenomeRng, Individual, MutationContext},
    schema::{BodyMutationConfig, ControllerConfig, GenomeConstraints},
};

fn grown_population(n: usize, max_modules: usize, seed: u64) -> Vec<Individual> {
    let constraints = GenomeConstraints {
        create_simple: false,
        max_modules,
        ..Default::default()
    };
    let controller = ControllerConfig::default();
    let mut rng = GenomeRng::new(seed);
    let mut ctx = MutationContext::new(&constraints, &controller, &mut rng);
    (0..n as u64)
        .map(|id| {
            let mut individual = Individual::new(id, &mut ctx);
            individual.fitness = ctx.rng.uniform((0.0, 10.0));
            individual.morph_age = ctx.rng.index(20) as u32;
            individual
        })
        .collect()
}

fn bench_mutate_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutate_body");
    let controller = ControllerConfig::default();
    let body = BodyMutationConfig::default();

    for max_modules in [10, 30, 60] {
        let constraints = GenomeConstraints {
            create_simple: false,
            max_modules,
            ..Default::default()
        };
        let template = grown_population(1, max_modules, 1).remove(0);
        let mut rng = GenomeRng::new(2);

        group.bench_with_input(
            BenchmarkId::from_parameter(max_modules),
            &max_modules,
            |b, _| {
                b.iter(|| {
                    let mut ctx = MutationContext::new(&constraints, &controller, &mut rng);
                    let mut individual = template.offspring(1);
                    individual.mutate_controller(&controller, ctx.rng);
                    black_box(individual.mutate_body(body.mutation_rate, &mut ctx));
                });
            },
        );
    }

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    for size in [50, 100, 200] {
        let population = grown_population(2 * size, 10, 3);
        let mut rng = GenomeRng::new(4);

        group.bench_with_input(
            BenchmarkId::new("remove_tournament", size),
            &size,
            |b, &size| {
                b.iter(|| {
                    black_box(remove_tournament(population.clone(), size, 2, true, &mut rng));
                });
            },
        );
        group.bench_with_input(BenchmarkId::new("pareto_selection", size), &size, |b, &size| {
            b.iter(|| black_box(pareto_selection(population.clone(), size)));
        });
    }

    group.finish();
}

fn bench_surrogate(c: &mut Criterion) {
    let population = grown_population(1, 30, 5);
    let genome = population[0].describe();
    let mut evaluator = SurrogateEvaluator::default();

    c.bench_function("surrogate_evaluate", |b| {
        b.iter(|| black_box(evaluator.evaluate(black_box(&genome))));
    });
}

criterion_group!(benches, bench_mutate_body, bench_selection, bench_surrogate);
criterion_main!(benches);
