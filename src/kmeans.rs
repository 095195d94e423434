use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    error::{ConfigError, NotReady},
    space,
};

/// Parameters of a streaming k-means model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KMeansConfig {
    /// maximum number of centroids
    pub k: usize,
    /// number of points after which a centroid weight is halved
    pub halflife: f64,
    /// number of points buffered before they are committed to the centroids
    pub chunk_size: usize,
    /// distance from every centroid above which a point opens a new centroid
    pub spawn_radius: f64,
    /// seed of the learn tie-break generator
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 5,
            halflife: 100.,
            chunk_size: 3,
            spawn_radius: 0.5,
            seed: 0,
        }
    }
}

impl KMeansConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::NoCluster);
        }
        if !(self.halflife.is_finite() && self.halflife > 0.) {
            return Err(ConfigError::Halflife(self.halflife));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::EmptyChunk);
        }
        if !(self.spawn_radius.is_finite() && self.spawn_radius >= 0.) {
            return Err(ConfigError::SpawnRadius(self.spawn_radius));
        }
        Ok(())
    }

    /// Weight factor applied for `points` newly committed points.
    fn decay(&self, points: usize) -> f64 {
        0.5f64.powf(points as f64 / self.halflife)
    }
}

/// A cluster representative in standardized space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Centroid<const D: usize> {
    /// position
    center: [f64; D],
    /// decayed number of points folded into this centroid
    weight: f64,
}

impl<const D: usize> Centroid<D> {
    fn new(center: [f64; D], weight: f64) -> Self {
        Centroid { center, weight }
    }

    pub fn center(&self) -> &[f64; D] {
        &self.center
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Moves the centroid to the barycentre of its weighted center and `point`.
    fn absorb(&mut self, point: &[f64; D]) {
        space::real_combine(&mut self.center, self.weight, point, 1.);
        self.weight += 1.;
    }

    /// Folds `other` into this centroid, weights included.
    fn merge(&mut self, other: &Centroid<D>) {
        space::real_combine(&mut self.center, self.weight, &other.center, other.weight);
        self.weight += other.weight;
    }
}

/// Growth stage of the centroid set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    /// no centroid yet
    Empty,
    /// fewer than `k` centroids
    Growing,
    /// `k` centroids
    Saturated,
}

/// Online k-means over `D`-dimensional points, with decaying centroid weights.
#[derive(Clone, Debug)]
pub struct StreamingKMeans<const D: usize> {
    config: KMeansConfig,
    centroids: Vec<Centroid<D>>,
    chunk: Vec<[f64; D]>,
    rng: StdRng,
}

impl<const D: usize> StreamingKMeans<D> {
    /// Builds an empty model.
    pub fn new(config: KMeansConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            centroids: Vec::with_capacity(config.k),
            chunk: Vec::with_capacity(config.chunk_size),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    pub fn state(&self) -> ModelState {
        match self.centroids.len() {
            0 => ModelState::Empty,
            n if n < self.config.k => ModelState::Growing,
            _ => ModelState::Saturated,
        }
    }

    /// A prediction needs at least two centroids.
    pub fn is_ready(&self) -> bool {
        self.centroids.len() >= 2
    }

    /// Committed centroids. An index keeps its centroid until a reseed hands it to a new one.
    pub fn centroids(&self) -> &[Centroid<D>] {
        &self.centroids
    }

    /// Points learned but not committed yet.
    pub fn pending(&self) -> usize {
        self.chunk.len()
    }

    /// Index of the nearest centroid; ties go to the lowest index.
    pub fn predict(&self, point: &[f64; D]) -> Result<usize, NotReady> {
        if !self.is_ready() {
            return Err(NotReady {
                centroids: self.centroids.len(),
            });
        }
        let mut nearest = 0;
        let mut min = f64::INFINITY;
        for (i, centroid) in self.centroids.iter().enumerate() {
            let d = space::euclid_dist(point, &centroid.center);
            if d < min {
                nearest = i;
                min = d;
            }
        }
        Ok(nearest)
    }

    /// Folds `point` in. While the model grows every point is committed at once; a saturated
    /// model buffers points and commits them `chunk_size` at a time.
    pub fn learn(&mut self, point: [f64; D]) {
        self.chunk.push(point);
        if self.state() != ModelState::Saturated || self.chunk.len() >= self.config.chunk_size {
            self.commit();
        }
    }

    /// Applies `f` to every centroid center and buffered point, for callers that move the
    /// space the points are expressed in.
    pub fn remap<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut [f64; D]),
    {
        self.centroids.iter_mut().for_each(|c| f(&mut c.center));
        self.chunk.iter_mut().for_each(f);
    }

    /// Decays every weight for the buffered points, then folds them in order.
    fn commit(&mut self) {
        let decay = self.config.decay(self.chunk.len());
        self.centroids.iter_mut().for_each(|c| c.weight *= decay);
        for point in std::mem::take(&mut self.chunk) {
            self.fold(&point);
        }
    }

    fn fold(&mut self, point: &[f64; D]) {
        let (nearest, d) = match self.nearest_for_update(point) {
            Some(found) => found,
            None => {
                self.centroids.push(Centroid::new(*point, 1.));
                return;
            }
        };
        let far = d.sqrt() > self.config.spawn_radius;
        if far && self.centroids.len() < self.config.k {
            self.centroids.push(Centroid::new(*point, 1.));
        } else if !(far && self.reseed(point, d)) {
            self.centroids[nearest].absorb(point);
        }
    }

    /// Makes room for a point lying farther from every centroid than the two closest centroids
    /// are from each other: that pair is merged into its lower index and the point takes the
    /// higher one. `d` is the squared distance from the point to its nearest centroid.
    fn reseed(&mut self, point: &[f64; D], d: f64) -> bool {
        match self.closest_pair() {
            Some((a, b, pair)) if d > pair => {
                let absorbed = self.centroids[b];
                self.centroids[a].merge(&absorbed);
                self.centroids[b] = Centroid::new(*point, 1.);
                true
            }
            _ => false,
        }
    }

    /// The two closest centroids, lowest indices first on ties, with their squared distance.
    fn closest_pair(&self) -> Option<(usize, usize, f64)> {
        let mut closest: Option<(usize, usize, f64)> = None;
        for (a, first) in self.centroids.iter().enumerate() {
            for (b, second) in self.centroids.iter().enumerate().skip(a + 1) {
                let d = space::euclid_dist(&first.center, &second.center);
                if closest.map_or(true, |(_, _, min)| d < min) {
                    closest = Some((a, b, d));
                }
            }
        }
        closest
    }

    /// Nearest centroid and its squared distance. Exact ties are drawn from the seeded generator.
    fn nearest_for_update(&mut self, point: &[f64; D]) -> Option<(usize, f64)> {
        let mut ties: Vec<usize> = vec![];
        let mut min = f64::INFINITY;
        for (i, centroid) in self.centroids.iter().enumerate() {
            let d = space::euclid_dist(point, &centroid.center);
            if d < min {
                ties.clear();
                min = d;
            }
            if d == min {
                ties.push(i);
            }
        }
        let nearest = if ties.len() > 1 {
            ties.choose(&mut self.rng).copied()
        } else {
            ties.first().copied()
        };
        nearest.map(|i| (i, min))
    }
}
