#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = native::run() {
        eprintln!("mesh_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use ground_mesh_engine::geom::{
        ExhaustiveOptions, GroundMesh, GroundMeshError, PipelineDiagnostics, PipelineOptions,
        build_ground_mesh, exhaustive_mesh,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::fmt::Write as _;
    use std::fs;
    use std::path::{Path, PathBuf};

    const SNAPSHOT_QUANTIZE: f64 = 1e-6;
    const SNAPSHOT_DECIMALS: usize = 6;
    /// Meshes above this vertex count are summarised instead of listed.
    const SNAPSHOT_FULL_LIMIT: usize = 64;
    const DEFAULT_SEED: u64 = 0x5eed;

    const USAGE: &str = r#"mesh_cli (ground-mesh-engine)

USAGE:
  mesh_cli list
  mesh_cli run <scenario|all> [options]

SCENARIOS:
  unit_quad
  random_square
  identical_points
  large_field
  collinear_line
  exhaustive_cloud

OPTIONS (run):
  --points <n>       Point count for generated scenarios
  --seed <s>         Seed for generated scenarios
  --out-dir <dir>    Write <scenario>.snap to this dir (required for `all`)
  --snap <path>      Write snapshot (single scenario only)
  --overwrite        Overwrite existing output files
  -h, --help         Show this help
"#;

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                print_scenarios();
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn print_scenarios() {
        for scenario in Scenario::ALL {
            println!("{}", scenario.name());
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct Generation {
        points: Option<usize>,
        seed: u64,
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let scenario_name = args.next().ok_or("missing scenario name")?;

        let mut out_dir: Option<PathBuf> = None;
        let mut snap_path: Option<PathBuf> = None;
        let mut overwrite = false;
        let mut generation = Generation {
            points: None,
            seed: DEFAULT_SEED,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--snap" => snap_path = Some(PathBuf::from(args.value("--snap")?)),
                "--points" => generation.points = Some(args.parsed("--points")?),
                "--seed" => generation.seed = args.parsed("--seed")?,
                "--overwrite" => overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        if let Some(dir) = out_dir.as_ref() {
            if snap_path.is_some() {
                return Err("use either --out-dir or --snap (not both)".to_string());
            }
            fs::create_dir_all(dir).map_err(|e| format!("create out dir: {e}"))?;

            if scenario_name == "all" {
                for scenario in Scenario::ALL {
                    run_one_scenario_to_dir(*scenario, generation, dir, overwrite)?;
                }
                return Ok(());
            }

            let scenario = Scenario::from_str(scenario_name.as_str())
                .ok_or_else(|| unknown_scenario(&scenario_name))?;
            return run_one_scenario_to_dir(scenario, generation, dir, overwrite);
        }

        if scenario_name == "all" {
            return Err("`run all` requires --out-dir".to_string());
        }

        let scenario =
            Scenario::from_str(scenario_name.as_str()).ok_or_else(|| unknown_scenario(&scenario_name))?;
        let output = run_scenario(scenario, generation)?;

        if let Some(path) = snap_path.as_deref() {
            write_text_file(path, &output.snapshot, overwrite)?;
            eprintln!("wrote {}", path.display());
        } else {
            print!("{}", output.snapshot);
        }

        print_summary(&output);
        Ok(())
    }

    fn run_one_scenario_to_dir(
        scenario: Scenario,
        generation: Generation,
        dir: &Path,
        overwrite: bool,
    ) -> Result<(), String> {
        let output = run_scenario(scenario, generation)?;
        let path = dir.join(format!("{}.snap", output.name));
        write_text_file(&path, &output.snapshot, overwrite)?;
        eprintln!("wrote {}", path.display());
        print_summary(&output);
        Ok(())
    }

    fn print_summary(output: &ScenarioOutput) {
        match (&output.mesh, &output.diagnostics, &output.error) {
            (Some(mesh), Some(diag), _) => eprintln!(
                "{}: vertices={} triangles={} | {}",
                output.name,
                mesh.vertex_count,
                mesh.triangle_count(),
                diag.summary()
            ),
            (Some(mesh), None, _) => eprintln!(
                "{}: vertices={} triangles={}",
                output.name,
                mesh.vertex_count,
                mesh.triangle_count()
            ),
            (None, _, Some(err)) => eprintln!("{}: error {err}", output.name),
            (None, _, None) => eprintln!("{}: no output", output.name),
        }
    }

    fn unknown_scenario(name: &str) -> String {
        let mut msg = String::new();
        let _ = writeln!(msg, "unknown scenario `{name}`\n\navailable scenarios:");
        for scenario in Scenario::ALL {
            let _ = writeln!(msg, "  {}", scenario.name());
        }
        msg
    }

    fn write_text_file(path: &Path, text: &str, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create dir {}: {e}", parent.display()))?;
        }
        fs::write(path, normalize_snapshot_text(text)).map_err(|e| format!("write {}: {e}", path.display()))
    }

    fn normalize_snapshot_text(text: &str) -> String {
        let normalized = text.replace("\r\n", "\n");
        if normalized.ends_with('\n') {
            normalized
        } else {
            format!("{normalized}\n")
        }
    }

    fn quantize_f64(value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let q = (value / SNAPSHOT_QUANTIZE).round() * SNAPSHOT_QUANTIZE;
        if q == 0.0 { 0.0 } else { q }
    }

    fn write_f64(out: &mut String, value: f64) {
        let value = quantize_f64(value);
        let _ = write!(out, "{value:.SNAPSHOT_DECIMALS$}");
    }

    fn write_vec3_line(out: &mut String, prefix: &str, v: &[f64]) {
        let _ = write!(out, "{prefix}");
        for c in v {
            out.push(' ');
            write_f64(out, *c);
        }
        out.push('\n');
    }

    fn write_mesh(out: &mut String, mesh: &GroundMesh) -> Result<(), String> {
        mesh.validate().map_err(|e| format!("mesh validation failed: {e}"))?;

        let _ = writeln!(out, "mesh.vertex_count {}", mesh.vertex_count);
        let _ = writeln!(out, "mesh.triangle_count {}", mesh.triangle_count());

        if mesh.vertex_count > SNAPSHOT_FULL_LIMIT {
            let up = mesh.normals.chunks_exact(3).filter(|n| n[1] > 0.0).count();
            let _ = writeln!(out, "mesh.normals_up {up}");
            let _ = writeln!(out, "mesh.listing omitted");
            return Ok(());
        }

        let _ = writeln!(out, "mesh.positions {}", mesh.vertex_count);
        for p in mesh.vertices.chunks_exact(3) {
            write_vec3_line(out, "p", p);
        }

        let _ = writeln!(out, "mesh.indices {}", mesh.index_count);
        for tri in mesh.indices.chunks_exact(3) {
            let _ = writeln!(out, "i {} {} {}", tri[0], tri[1], tri[2]);
        }

        let _ = writeln!(out, "mesh.normals {}", mesh.vertex_count);
        for n in mesh.normals.chunks_exact(3) {
            write_vec3_line(out, "n", n);
        }
        Ok(())
    }

    fn write_pipeline_diagnostics(out: &mut String, diag: &PipelineDiagnostics) {
        let _ = writeln!(out, "diag.input_count {}", diag.input_count);
        let _ = writeln!(out, "diag.deduplicated_count {}", diag.deduplicated_count);
        let _ = writeln!(out, "diag.validated_count {}", diag.validated_count);
        let _ = writeln!(out, "diag.duplicates_removed {}", diag.duplicates_removed);
        let _ = writeln!(out, "diag.non_finite_dropped {}", diag.non_finite_dropped);
        let _ = writeln!(out, "diag.attempts {}", diag.attempts);
        let _ = writeln!(out, "diag.final_state {:?}", diag.final_state);
        let _ = writeln!(out, "diag.collinearity_corrected {}", diag.collinearity_corrected);
        let _ = writeln!(out, "diag.perturbed {}", diag.perturbed);
        let _ = writeln!(out, "diag.corner_fallback_used {}", diag.corner_fallback_used);
        let _ = writeln!(out, "diag.health {}", diag.health);
        let _ = writeln!(out, "diag.flipped_triangles {}", diag.flipped_triangles);
        let _ = writeln!(out, "diag.degenerate_faces {}", diag.degenerate_faces);
        let _ = writeln!(out, "diag.strategy_count {}", diag.strategies.len());
        for (idx, strategy) in diag.strategies.iter().enumerate() {
            let _ = writeln!(out, "diag.strategy.{idx} {strategy:?}");
        }
        let _ = writeln!(out, "diag.warning_count {}", diag.warnings.len());
        for (idx, warning) in diag.warnings.iter().enumerate() {
            let _ = writeln!(out, "diag.warning.{idx} {warning}");
        }
    }

    fn snapshot(op: &str, sections: impl FnOnce(&mut String) -> Result<(), String>) -> Result<String, String> {
        let mut out = String::new();
        let _ = writeln!(out, "# ground-mesh-engine snapshot v1");
        let _ = writeln!(out, "op {op}");
        let _ = writeln!(out, "quantize {SNAPSHOT_QUANTIZE:.1e}");
        sections(&mut out)?;
        Ok(normalize_snapshot_text(&out))
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Scenario {
        UnitQuad,
        RandomSquare,
        IdenticalPoints,
        LargeField,
        CollinearLine,
        ExhaustiveCloud,
    }

    impl Scenario {
        const ALL: &'static [Scenario] = &[
            Scenario::UnitQuad,
            Scenario::RandomSquare,
            Scenario::IdenticalPoints,
            Scenario::LargeField,
            Scenario::CollinearLine,
            Scenario::ExhaustiveCloud,
        ];

        fn name(self) -> &'static str {
            match self {
                Scenario::UnitQuad => "unit_quad",
                Scenario::RandomSquare => "random_square",
                Scenario::IdenticalPoints => "identical_points",
                Scenario::LargeField => "large_field",
                Scenario::CollinearLine => "collinear_line",
                Scenario::ExhaustiveCloud => "exhaustive_cloud",
            }
        }

        fn from_str(name: &str) -> Option<Self> {
            Scenario::ALL.iter().copied().find(|s| s.name() == name)
        }

        fn default_points(self) -> usize {
            match self {
                Scenario::UnitQuad => 4,
                Scenario::RandomSquare => 5_000,
                Scenario::IdenticalPoints => 100,
                Scenario::LargeField => 200_000,
                Scenario::CollinearLine => 50,
                Scenario::ExhaustiveCloud => 40,
            }
        }
    }

    struct ScenarioOutput {
        name: &'static str,
        mesh: Option<GroundMesh>,
        diagnostics: Option<PipelineDiagnostics>,
        error: Option<GroundMeshError>,
        snapshot: String,
    }

    fn generate_positions(scenario: Scenario, count: usize, rng: &mut StdRng) -> Vec<f64> {
        match scenario {
            Scenario::UnitQuad => vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            Scenario::RandomSquare => (0..count)
                .flat_map(|_| [rng.random_range(0.0..1.0), 0.0, rng.random_range(0.0..1.0)])
                .collect(),
            Scenario::IdenticalPoints => std::iter::repeat_n([3.0, 1.0, -2.0], count).flatten().collect(),
            Scenario::LargeField => (0..count)
                .flat_map(|_| {
                    let x = rng.random_range(-5_000.0..5_000.0);
                    let z = rng.random_range(-5_000.0..5_000.0);
                    [x, rng.random_range(-1.0..1.0), z]
                })
                .collect(),
            Scenario::CollinearLine => (0..count).flat_map(|i| [i as f64, 0.0, 0.0]).collect(),
            Scenario::ExhaustiveCloud => (0..count)
                .flat_map(|_| {
                    [
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                    ]
                })
                .collect(),
        }
    }

    fn run_scenario(scenario: Scenario, generation: Generation) -> Result<ScenarioOutput, String> {
        let count = match scenario {
            Scenario::UnitQuad => 4,
            _ => generation.points.unwrap_or_else(|| scenario.default_points()),
        };
        let mut rng = StdRng::seed_from_u64(generation.seed);
        let positions = generate_positions(scenario, count, &mut rng);
        let name = scenario.name();

        if scenario == Scenario::ExhaustiveCloud {
            let result = exhaustive_mesh(&positions, count, &ExhaustiveOptions::default());
            let snap = snapshot(name, |out| {
                let _ = writeln!(out, "input.count {count}");
                match &result {
                    Ok(mesh) => write_mesh(out, mesh),
                    Err(err) => {
                        let _ = writeln!(out, "error {err}");
                        Ok(())
                    }
                }
            })?;
            let (mesh, error) = match result {
                Ok(mesh) => (Some(mesh), None),
                Err(err) => (None, Some(err)),
            };
            return Ok(ScenarioOutput {
                name,
                mesh,
                diagnostics: None,
                error,
                snapshot: snap,
            });
        }

        let result = build_ground_mesh(&positions, count, None, &PipelineOptions::default());
        let snap = snapshot(name, |out| {
            let _ = writeln!(out, "input.count {count}");
            let _ = writeln!(out, "input.seed {}", generation.seed);
            match &result {
                Ok(output) => {
                    write_pipeline_diagnostics(out, &output.diagnostics);
                    write_mesh(out, &output.mesh)
                }
                Err(err) => {
                    let _ = writeln!(out, "error {err}");
                    Ok(())
                }
            }
        })?;

        let (mesh, diagnostics, error) = match result {
            Ok(output) => (Some(output.mesh), Some(output.diagnostics), None),
            Err(err) => (None, None, Some(err)),
        };

        Ok(ScenarioOutput {
            name,
            mesh,
            diagnostics,
            error,
            snapshot: snap,
        })
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        }

        fn parsed<T: std::str::FromStr>(&mut self, flag: &str) -> Result<T, String>
        where
            T::Err: std::fmt::Display,
        {
            let raw = self.value(flag)?;
            raw.parse()
                .map_err(|e| format!("invalid value `{raw}` for {flag}: {e}"))
        }
    }
}
