#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = native::run() {
        eprintln!("cpom_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use cpom_engine::geom::{
        AngleTolerance, BuildQuality, BvhBuildOptions, GeomMetrics, MeshIndex, Point3,
        TimingBucket, Triangle, TriangleSet, Vec3, Winding, deserialize_bvh, serialize_bvh,
        triangles_from_indexed,
    };
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter};
    use std::path::{Path, PathBuf};

    const USAGE: &str = r"cpom_cli (cpom-engine)

USAGE:
  cpom_cli stats <mesh.obj> [options]
  cpom_cli build <mesh.obj> --out <file.bvh> [options]
  cpom_cli query <mesh.obj> --point <x,y,z> --normal <x,y,z> [options]

OPTIONS:
  --quality <low|medium|high>  SAH bin count (default: high)
  --sequential                 Build on the calling thread only
  --clockwise                  Treat faces as clockwise (flips normals)
  --out <path>                 Output file for `build`
  --overwrite                  Overwrite an existing output file
  --bvh <path>                 Load a serialized hierarchy instead of building (query)
  --point <x,y,z>              Query point (query)
  --normal <x,y,z>             Query normal (query)
  --angle <degrees>            Normal tolerance, 180 disables the filter (default: 60)
  -h, --help                   Show this help
";

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "stats" => cmd_stats(&mut args),
            "build" => cmd_build(&mut args),
            "query" => cmd_query(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command '{other}' (try --help)")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    #[derive(Debug, Default)]
    struct Options {
        mesh: PathBuf,
        build: BvhBuildOptions,
        winding: Winding,
        out: Option<PathBuf>,
        overwrite: bool,
        bvh: Option<PathBuf>,
        point: Option<Point3>,
        normal: Option<Vec3>,
        angle: Option<AngleTolerance>,
    }

    fn parse_options(args: &mut Args) -> Result<Options, String> {
        let mesh = args.next().ok_or("missing mesh path")?;
        let mut opts = Options {
            mesh: PathBuf::from(mesh),
            ..Default::default()
        };

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--quality" => {
                    opts.build.quality = match args.value(&flag)?.as_str() {
                        "low" => BuildQuality::Low,
                        "medium" => BuildQuality::Medium,
                        "high" => BuildQuality::High,
                        other => return Err(format!("unknown quality '{other}'")),
                    };
                }
                "--sequential" => opts.build = opts.build.sequential(),
                "--clockwise" => opts.winding = Winding::Clockwise,
                "--out" => opts.out = Some(PathBuf::from(args.value(&flag)?)),
                "--overwrite" => opts.overwrite = true,
                "--bvh" => opts.bvh = Some(PathBuf::from(args.value(&flag)?)),
                "--point" => opts.point = Some(Point3::from_array(parse_triple(&args.value(&flag)?)?)),
                "--normal" => opts.normal = Some(Vec3::from_array(parse_triple(&args.value(&flag)?)?)),
                "--angle" => {
                    let degrees: f64 = args
                        .value(&flag)?
                        .parse()
                        .map_err(|e| format!("invalid --angle: {e}"))?;
                    opts.angle = Some(AngleTolerance::from_degrees(degrees).map_err(|e| e.to_string())?);
                }
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => return Err(format!("unknown option '{other}'")),
            }
        }

        Ok(opts)
    }

    fn cmd_stats(args: &mut Args) -> Result<(), String> {
        let opts = parse_options(args)?;
        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let index = build_index(&opts, &mut metrics)?;

        let mut diagnostics = index.diagnostics();
        diagnostics.timing = metrics.end();
        println!(
            "{} triangles from {} ({:?} winding)",
            index.triangles().len(),
            opts.mesh.display(),
            index.triangles().winding()
        );
        print!("{diagnostics}");
        Ok(())
    }

    fn cmd_build(args: &mut Args) -> Result<(), String> {
        let opts = parse_options(args)?;
        let out = opts.out.clone().ok_or("build requires --out <path>")?;
        if out.exists() && !opts.overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                out.display()
            ));
        }
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| format!("create dir {}: {e}", parent.display()))?;
        }

        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let index = build_index(&opts, &mut metrics)?;

        let file = File::create(&out).map_err(|e| format!("create {}: {e}", out.display()))?;
        metrics
            .time(TimingBucket::Serialization, || serialize_bvh(index.bvh(), BufWriter::new(file)))
            .map_err(|e| format!("write {}: {e}", out.display()))?;

        println!("wrote {}: {}", out.display(), index.bvh().diagnostics().summary());
        if let Some(report) = metrics.end() {
            println!("timing: {:.3} ms total", report.total_ms());
        }
        Ok(())
    }

    fn cmd_query(args: &mut Args) -> Result<(), String> {
        let opts = parse_options(args)?;
        let point = opts.point.ok_or("query requires --point x,y,z")?;
        let normal = opts.normal.ok_or("query requires --normal x,y,z")?;
        let tolerance = opts.angle.unwrap_or_default();

        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let index = match &opts.bvh {
            Some(path) => load_index(&opts, path, &mut metrics)?,
            None => build_index(&opts, &mut metrics)?,
        };

        let result = metrics.time(TimingBucket::Query, || index.closest_point(point, normal, tolerance));
        match result.triangle {
            Some(triangle) => {
                let [x, y, z] = result.point.to_array();
                let [u, v, w] = result.barycentric.to_array();
                println!("triangle    {triangle}");
                println!("point       {x} {y} {z}");
                println!("barycentric {u} {v} {w}");
                println!("distance    {}", result.distance());
            }
            None => println!("no triangle within {:.3} degrees", tolerance.radians().to_degrees()),
        }
        if let Some(report) = metrics.end() {
            println!("timing: {:.3} ms total", report.total_ms());
        }
        Ok(())
    }

    fn build_index(opts: &Options, metrics: &mut GeomMetrics) -> Result<MeshIndex, String> {
        let triangles = read_mesh(&opts.mesh)?;
        Ok(MeshIndex::build_with_metrics(triangles, opts.winding, &opts.build, metrics))
    }

    fn load_index(opts: &Options, bvh_path: &Path, metrics: &mut GeomMetrics) -> Result<MeshIndex, String> {
        let set = TriangleSet::with_winding(read_mesh(&opts.mesh)?, opts.winding);
        let file = File::open(bvh_path).map_err(|e| format!("open {}: {e}", bvh_path.display()))?;
        let bvh = metrics
            .time(TimingBucket::Serialization, || deserialize_bvh(BufReader::new(file)))
            .map_err(|e| format!("read {}: {e}", bvh_path.display()))?;
        MeshIndex::from_parts(set, bvh).map_err(|e| format!("{} does not match the mesh: {e}", bvh_path.display()))
    }

    fn read_mesh(path: &Path) -> Result<Vec<Triangle>, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        let (positions, indices) = parse_obj(&text).map_err(|e| format!("{}: {e}", path.display()))?;
        triangles_from_indexed(&positions, &indices).map_err(|e| format!("{}: {e}", path.display()))
    }

    /// Vertex positions and fan-triangulated faces of a Wavefront OBJ file.
    /// Texture and normal references in face corners are ignored.
    fn parse_obj(text: &str) -> Result<(Vec<Point3>, Vec<u32>), String> {
        let mut positions = Vec::new();
        let mut indices = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("v") => {
                    let coords: Vec<f64> = parts
                        .take(3)
                        .map(str::parse)
                        .collect::<Result<_, _>>()
                        .map_err(|e| format!("line {}: {e}", line_no + 1))?;
                    let [x, y, z] = coords[..] else {
                        return Err(format!("line {}: vertex needs 3 coordinates", line_no + 1));
                    };
                    positions.push(Point3::new(x, y, z));
                }
                Some("f") => {
                    let corners = parts
                        .map(|corner| resolve_corner(corner, positions.len()))
                        .collect::<Result<Vec<u32>, _>>()
                        .map_err(|e| format!("line {}: {e}", line_no + 1))?;
                    if corners.len() < 3 {
                        return Err(format!("line {}: face needs at least 3 corners", line_no + 1));
                    }
                    for i in 1..corners.len() - 1 {
                        indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        Ok((positions, indices))
    }

    fn resolve_corner(corner: &str, vertex_count: usize) -> Result<u32, String> {
        let head = corner.split('/').next().unwrap_or_default();
        let index: i64 = head.parse().map_err(|e| format!("bad face index '{corner}': {e}"))?;
        let resolved = if index < 0 {
            vertex_count as i64 + index
        } else {
            index - 1
        };
        u32::try_from(resolved).map_err(|_| format!("face index {index} out of range"))
    }

    fn parse_triple(text: &str) -> Result<[f64; 3], String> {
        let values: Vec<f64> = text
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid triple '{text}': {e}"))?;
        match values[..] {
            [x, y, z] => Ok([x, y, z]),
            _ => Err(format!("expected x,y,z but got '{text}'")),
        }
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
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_obj_fans_quads() {
            let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1/1/1 2/2/1 3/3/1 4/4/1\n";
            let (positions, indices) = parse_obj(obj).unwrap();
            assert_eq!(positions.len(), 4);
            assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
        }

        #[test]
        fn test_parse_obj_negative_indices() {
            let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
            let (_, indices) = parse_obj(obj).unwrap();
            assert_eq!(indices, vec![0, 1, 2]);
        }

        #[test]
        fn test_parse_triple() {
            assert_eq!(parse_triple("1, 2.5,-3").unwrap(), [1.0, 2.5, -3.0]);
            assert!(parse_triple("1,2").is_err());
        }
    }
}
