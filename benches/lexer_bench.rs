use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lispy::{parse, run, tokenize};

// One block of typical programs; repeated to get a larger input
const PROGRAM: &str = r#"
(let ((square (lambda (x) (* x x)))
      (even (lambda (x) (= (% x 2) 0))))
  (length (filter even (map square (range 1 200)))))

(for i 1 100 (concat "item " (str i)))

(let ((x 10) (y 3))
  (if (and (>= x y) (<= y 5))
      (list (+ x y) (- x y) (/ x y) (% x y))
      "unreachable"))

(concat "string with escapes \"\n\t\\\" " "done")
(sqrt (+ (* 3 3) (* 4 4)))
"#;

fn bench_tokenizer(c: &mut Criterion) {
    let input = PROGRAM.repeat(50);
    let mut group = c.benchmark_group("Tokenizer");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "repeated_program"),
        &input,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline");

    // Tokens are rebuilt each iteration since parsing consumes them
    group.bench_function(BenchmarkId::new("parse", "program"), |b| {
        b.iter(|| tokenize(black_box(PROGRAM)).map(parse))
    });
    group.bench_function(BenchmarkId::new("run", "program"), |b| {
        b.iter(|| run(black_box(PROGRAM)))
    });

    group.finish();
}

criterion_group!(benches, bench_tokenizer, bench_pipeline);
criterion_main!(benches);
