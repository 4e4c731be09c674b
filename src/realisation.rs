//! Drawing explicit dated embeddings ("realisations") of the guest tree
//! from the DP tables, and writing them out.

use std::io::Write;

use csv::{QuoteStyle, Writer, WriterBuilder};
use rand::Rng;

use crate::discretisation::Point;
use crate::error::Result;
use crate::newick;
use crate::reconciliation::{DpInputs, ReconciliationDp};
use crate::tree::{RBTree, VertexId};

/// Below this total weight the sampler has no signal and draws uniformly.
const MIN_TOTAL_WEIGHT: f64 = 1e-256;

/// One dated embedding of the guest tree in the discretised host tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Realisation {
    placements: Vec<Point>,
    abs_times: Vec<f64>,
    arc_times: Vec<f64>,
    duplications: Vec<bool>,
}

impl Realisation {
    pub fn placement(&self, u: VertexId) -> Point {
        self.placements[u]
    }

    pub fn abs_time(&self, u: VertexId) -> f64 {
        self.abs_times[u]
    }

    /// Time from `u` up to its parent, or up to the host tip for the root.
    pub fn arc_time(&self, u: VertexId) -> f64 {
        self.arc_times[u]
    }

    pub fn is_duplication(&self, u: VertexId) -> bool {
        self.duplications[u]
    }

    /// Newick with arc times as branch lengths and each vertex's type and
    /// discretisation point as meta data.
    pub fn to_newick(&self, guest: &RBTree) -> String {
        newick::write_annotated(
            guest,
            |u| guest.name(u).map(str::to_string),
            |u| Some(self.arc_times[u]),
            |u| {
                let kind = if guest.is_leaf(u) {
                    "Leaf"
                } else if self.duplications[u] {
                    "Duplication"
                } else {
                    "Speciation"
                };
                Some(format!(
                    "[&&PRIME VERTEXTYPE={} DISCPT={}]",
                    kind, self.placements[u]
                ))
            },
        )
    }
}

/// How each vertex's placement is chosen among the weighted candidates.
enum Choice<'r, R> {
    Random(&'r mut R),
    /// Per-vertex argmax. Greedy, so NOT a maximum a posteriori realisation.
    Greedy,
}

/// Samples realisations top-down using the `ats` tables of a computed DP.
pub struct RealisationSampler<'a> {
    inputs: DpInputs<'a>,
    dp: &'a ReconciliationDp,
}

impl<'a> RealisationSampler<'a> {
    pub fn new(inputs: DpInputs<'a>, dp: &'a ReconciliationDp) -> Self {
        Self { inputs, dp }
    }

    /// Draws one realisation from the posterior over placements.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Realisation {
        self.realise(Choice::Random(rng))
    }

    /// Places every vertex at its individually most probable point given
    /// its parent. This is a greedy walk and does not in general yield the
    /// jointly most probable realisation.
    pub fn most_probable(&self) -> Realisation {
        self.realise::<rand::rngs::StdRng>(Choice::Greedy)
    }

    /// Candidate placements of `u` strictly below `x`, with weights.
    pub fn weighted_placements(&self, u: VertexId, x: Point) -> Vec<(Point, f64)> {
        let inputs = &self.inputs;
        let xt = inputs.disc.time(x);
        inputs
            .placements
            .placements(u, inputs.disc)
            .zip(self.dp.ats(u))
            .take_while(|(y, _)| !(y.arc == x.arc && y.index >= x.index))
            .map(|(y, &at)| {
                let dens = inputs.rate_density(u, xt - inputs.disc.time(y));
                (y, dens * inputs.dup_loss.p11(x, y) * at)
            })
            .collect()
    }

    fn realise<R: Rng>(&self, mut choice: Choice<'_, R>) -> Realisation {
        let inputs = &self.inputs;
        let n = inputs.guest.vertex_count();
        let mut placements = vec![Point::new(0, 0); n];
        let mut abs_times = vec![0.0; n];
        let mut arc_times = vec![0.0; n];
        let mut duplications = vec![false; n];

        for u in inputs.guest.topological_order() {
            let x = match inputs.guest.parent(u) {
                Some(p) => placements[p],
                None => inputs.disc.tip(),
            };
            let y = if inputs.guest.is_leaf(u) {
                inputs.placements.lower_limit(u)
            } else {
                let candidates = self.weighted_placements(u, x);
                pick(&candidates, &mut choice)
            };
            placements[u] = y;
            abs_times[u] = inputs.disc.time(y);
            arc_times[u] = inputs.disc.time(x) - abs_times[u];
            duplications[u] = y.index > 0;
        }

        Realisation {
            placements,
            abs_times,
            arc_times,
            duplications,
        }
    }
}

fn pick<R: Rng>(candidates: &[(Point, f64)], choice: &mut Choice<'_, R>) -> Point {
    let total: f64 = candidates.iter().map(|(_, w)| w).sum();
    match choice {
        Choice::Greedy => candidates
            .iter()
            .fold(candidates[0], |best, &c| if c.1 > best.1 { c } else { best })
            .0,
        Choice::Random(rng) if total < MIN_TOTAL_WEIGHT => {
            candidates[rng.gen_range(0..candidates.len())].0
        }
        Choice::Random(rng) => {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            for &(y, w) in candidates {
                cumulative += w;
                if cumulative >= target {
                    return y;
                }
            }
            candidates[candidates.len() - 1].0
        }
    }
}

/// Writes realisations as `RealisationID<TAB>Subsample<TAB>Realisation`
/// rows after a host tree comment and a header line.
pub struct RealisationWriter<W: Write> {
    wtr: Writer<W>,
}

impl<W: Write> RealisationWriter<W> {
    pub fn new(mut writer: W, host_newick: &str) -> Result<Self> {
        writeln!(writer, "# Host tree: {}", host_newick)?;
        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .from_writer(writer);
        wtr.write_record(["RealisationID", "Subsample", "Realisation"])?;
        Ok(Self { wtr })
    }

    pub fn write(&mut self, id: usize, subsample: usize, realisation: &str) -> Result<()> {
        self.wtr
            .write_record([id.to_string(), subsample.to_string(), realisation.to_string()])?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateDistributionConfig;
    use crate::reconciliation::tests::{four_leaf, model, scenario};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn placements_respect_limits() {
        let m = four_leaf(0.3, 0.2);
        let dp = ReconciliationDp::new(&m.inputs());
        let sampler = RealisationSampler::new(m.inputs(), &dp);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let r = sampler.sample(&mut rng);
            for u in 0..m.guest.vertex_count() {
                assert!(r.arc_time(u) > 0.0 || m.guest.is_root(u), "vertex {}", u);
                let allowed: Vec<Point> = m.placements.placements(u, &m.disc).collect();
                assert!(allowed.contains(&r.placement(u)));
                if let Some(p) = m.guest.parent(u) {
                    assert!(r.abs_time(u) < r.abs_time(p));
                }
            }
        }
    }

    #[test]
    fn speciation_scenario_is_fixed() {
        let m = scenario(0.1, 0.1);
        let dp = ReconciliationDp::new(&m.inputs());
        let sampler = RealisationSampler::new(m.inputs(), &dp);
        let mut rng = StdRng::seed_from_u64(1);
        let r = sampler.sample(&mut rng);
        let root = m.guest.root();
        // Only the speciation has positive weight.
        assert_eq!(r.placement(root), Point::new(m.disc.tree().root(), 0));
        assert!(!r.is_duplication(root));
        assert_eq!(r.abs_time(root), 1.0);
        let text = r.to_newick(&m.guest);
        assert!(text.starts_with("(a:1[&&PRIME VERTEXTYPE=Leaf DISCPT=("));
        assert!(text.ends_with(":0[&&PRIME VERTEXTYPE=Speciation DISCPT=(0,0)];"));
    }

    fn duplication_model(lambda: f64) -> crate::reconciliation::tests::Model {
        model(
            "(A:1.0,B:1.0):0.5;",
            "(a1:0.2,a2:0.3):0.1;",
            &[("a1", "A"), ("a2", "A")],
            3,
            Some(2),
            lambda,
            0.3,
            RateDistributionConfig::Gamma {
                mean: 0.4,
                variance: 0.2,
            },
        )
    }

    #[test]
    fn empirical_placements_converge_to_posterior() {
        let m = duplication_model(0.5);
        let dp = ReconciliationDp::new(&m.inputs());
        let sampler = RealisationSampler::new(m.inputs(), &dp);
        let root = m.guest.root();
        let weights = sampler.weighted_placements(root, m.disc.tip());
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((total - dp.data_probability().value()).abs() < 1e-12 * total);

        let draws = 20_000;
        let mut counts = vec![0usize; weights.len()];
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..draws {
            let r = sampler.sample(&mut rng);
            let i = weights.iter().position(|(p, _)| *p == r.placement(root)).unwrap();
            counts[i] += 1;
        }
        for ((_, w), c) in weights.iter().zip(&counts) {
            let expected = w / total;
            let observed = *c as f64 / draws as f64;
            assert!((expected - observed).abs() < 0.02, "{} vs {}", expected, observed);
        }
    }

    #[test]
    fn no_signal_falls_back_to_uniform() {
        // Without duplications a duplication root has zero weight everywhere.
        let m = duplication_model(0.0);
        let dp = ReconciliationDp::new(&m.inputs());
        assert!(dp.data_probability().is_zero());
        let sampler = RealisationSampler::new(m.inputs(), &dp);
        let mut rng = StdRng::seed_from_u64(3);
        let root = m.guest.root();
        let allowed: Vec<Point> = m.placements.placements(root, &m.disc).collect();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let p = sampler.sample(&mut rng).placement(root);
            assert!(allowed.contains(&p));
            seen.insert(p);
        }
        assert_eq!(seen.len(), allowed.len());
    }

    #[test]
    fn greedy_picks_heaviest_candidate() {
        let m = duplication_model(0.5);
        let dp = ReconciliationDp::new(&m.inputs());
        let sampler = RealisationSampler::new(m.inputs(), &dp);
        let root = m.guest.root();
        let weights = sampler.weighted_placements(root, m.disc.tip());
        let best = weights
            .iter()
            .fold(weights[0], |b, &c| if c.1 > b.1 { c } else { b })
            .0;
        let r = sampler.most_probable();
        assert_eq!(r.placement(root), best);
        assert_eq!(sampler.most_probable(), r);
    }

    #[test]
    fn writer_emits_comment_header_and_rows() {
        let mut buf = Vec::new();
        let mut w = RealisationWriter::new(&mut buf, "(A:1,B:1);").unwrap();
        w.write(0, 0, "(a:1,b:1);").unwrap();
        w.write(0, 1, "(a:1,b:1);").unwrap();
        w.finish().unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# Host tree: (A:1,B:1);");
        assert_eq!(lines[1], "RealisationID\tSubsample\tRealisation");
        assert_eq!(lines[2], "0\t0\t(a:1,b:1);");
        assert_eq!(lines[3], "0\t1\t(a:1,b:1);");
    }
}
