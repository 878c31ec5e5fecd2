//! Scoring functions (spec §4.8): each is a small family of hooks —
//! PER_CALL (once per query term), PER_DOC (per matching document), CONTRIB
//! (the same contribution computed in isolation, used by the THRESHOLD
//! phase to translate a candidate `thresh` into `v_t`), and an optional
//! POST (once per query, over the whole accumulator list).
//!
//! Represented as an enum rather than `dyn Trait` objects: the set of
//! scoring functions is closed and small, and an enum lets `per_call` hand
//! back a plain `TermConstants` value instead of a boxed closure per term.

#[derive(Debug, Clone, Copy)]
pub enum ScoringFunction {
    Cosine,
    Bm25K3 { k1: f32, b: f32 },
    Dirichlet { mu: f32 },
    PivotedCosine { slope: f32 },
    HawkApi { alpha: f32 },
}

/// Collection-wide and per-term statistics `per_call` needs, gathered once
/// the conjunct's vocabulary record and the index's param header are known.
#[derive(Debug, Clone, Copy)]
pub struct TermStats {
    pub f_qt: u64,
    pub f_t: u64,
    pub big_f_t: u64,
    pub n: u64,
    pub avgdl: f64,
    pub sum_big_f: u64,
}

/// Constants `per_call` derives once per query term; threaded through every
/// subsequent `per_doc`/`contrib` call for that term.
#[derive(Debug, Clone, Copy)]
pub struct TermConstants {
    w_qt: f32,
    k1: f32,
    b: f32,
    avgdl: f64,
    n: u64,
    f_t: u64,
    big_f_t: u64,
    sum_big_f: u64,
    mu: f32,
    slope: f32,
    alpha: f32,
}

impl ScoringFunction {
    pub fn per_call(&self, stats: TermStats) -> TermConstants {
        let base = TermConstants {
            w_qt: 1.0 + (stats.f_qt.max(1) as f32).ln(),
            k1: 1.2,
            b: 0.75,
            avgdl: stats.avgdl,
            n: stats.n,
            f_t: stats.f_t,
            big_f_t: stats.big_f_t,
            sum_big_f: stats.sum_big_f,
            mu: 2000.0,
            slope: 0.2,
            alpha: 0.5,
        };
        match *self {
            ScoringFunction::Bm25K3 { k1, b } => TermConstants { k1, b, ..base },
            ScoringFunction::Dirichlet { mu } => TermConstants { mu, ..base },
            ScoringFunction::PivotedCosine { slope } => TermConstants { slope, ..base },
            ScoringFunction::HawkApi { alpha } => TermConstants { alpha, ..base },
            ScoringFunction::Cosine => base,
        }
    }

    /// The contribution a document with the given `(f_dt, dl)` would
    /// receive, independent of any particular accumulator — used both by
    /// `per_doc` (applied to a real document) and `contrib` (applied to a
    /// hypothetical `thresh` boundary).
    pub fn contrib(&self, c: &TermConstants, f_dt: u64, dl: u64) -> f32 {
        if f_dt == 0 {
            return 0.0;
        }
        match *self {
            ScoringFunction::Cosine => c.w_qt * (1.0 + (f_dt as f32).ln()),
            ScoringFunction::Bm25K3 { .. } => {
                let k = c.k1 * ((1.0 - c.b) + c.b * (dl as f64 / c.avgdl.max(1.0)) as f32);
                let idf = (((c.n.saturating_sub(c.f_t)) as f32 + 0.5) / (c.f_t as f32 + 0.5)).ln();
                c.w_qt * ((c.k1 + 1.0) * f_dt as f32) / (k + f_dt as f32) * idf.max(0.0)
            }
            ScoringFunction::Dirichlet { .. } => {
                let p_ml = c.big_f_t as f64 / c.sum_big_f.max(1) as f64;
                let score = (f_dt as f64 + c.mu as f64 * p_ml) / (dl as f64 + c.mu as f64);
                c.w_qt * (score.max(f64::MIN_POSITIVE).ln() as f32)
            }
            ScoringFunction::PivotedCosine { .. } => {
                let norm = (1.0 - c.slope) + c.slope * (dl as f32 / c.avgdl.max(1.0) as f32);
                c.w_qt * (1.0 + (f_dt as f32).ln()) / norm.max(1e-6)
            }
            ScoringFunction::HawkApi { .. } => {
                c.w_qt * (f_dt as f32).powf(c.alpha) / (1.0 + (dl as f32).ln())
            }
        }
    }

    /// Per-document contribution applied during OR/THRESHOLD/AND
    /// processing; identical to `contrib` for every scoring family in this
    /// engine (none of them need the accumulator's running total to decide
    /// a single document's share).
    pub fn per_doc(&self, c: &TermConstants, f_dt: u64, dl: u64) -> f32 {
        self.contrib(c, f_dt, dl)
    }

    /// Whole-accumulator-list pass after all conjuncts are processed.
    /// Cosine is the only family with a non-identity POST hook (spec
    /// §4.8: divide by `doc_weight * query_weight`).
    pub fn post(&self, weight: f32, doc_weight: f32, query_weight: f32) -> f32 {
        match *self {
            ScoringFunction::Cosine => {
                let denom = doc_weight * query_weight;
                if denom > 0.0 {
                    weight / denom
                } else {
                    0.0
                }
            }
            _ => weight,
        }
    }
}
