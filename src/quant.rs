//! Palette generation via NeuQuant, Anthony Dekker's self-organizing map
//! quantizer (1994), in its classic fixed-point form.
//!
//! The map is trained once on the first frame of a clip and then frozen;
//! every later frame is mapped through [`NeuQuant::lookup`].

use rgb::RGB8;

const NCYCLES: i32 = 100;
const NETSIZE: usize = 256;
const MAXNETPOS: i32 = NETSIZE as i32 - 1;

/// Color values are carried with 4 fractional bits while training.
const NETBIASSHIFT: i32 = 4;
const INTBIASSHIFT: i32 = 16;
const INTBIAS: i32 = 1 << INTBIASSHIFT;
const GAMMASHIFT: i32 = 10;
const BETASHIFT: i32 = 10;
const BETA: i32 = INTBIAS >> BETASHIFT;
const BETAGAMMA: i32 = INTBIAS << (GAMMASHIFT - BETASHIFT);

/// Neighborhood radius starts at 32 and decays by 1/30 per cycle.
const INITRAD: i32 = (NETSIZE >> 3) as i32;
const RADIUSBIASSHIFT: i32 = 6;
const RADIUSBIAS: i32 = 1 << RADIUSBIASSHIFT;
const INITRADIUS: i32 = INITRAD * RADIUSBIAS;
const RADIUSDEC: i32 = 30;

/// Learning rate starts at 1.0 (biased by 10 bits).
const ALPHABIASSHIFT: i32 = 10;
const INITALPHA: i32 = 1 << ALPHABIASSHIFT;
const RADBIASSHIFT: i32 = 8;
const RADBIAS: i32 = 1 << RADBIASSHIFT;
const ALPHARADBSHIFT: i32 = ALPHABIASSHIFT + RADBIASSHIFT;
const ALPHARADBIAS: i32 = 1 << ALPHARADBSHIFT;

/// Pseudo-random sampling strides, coprime with typical raster widths.
const PRIME1: usize = 499;
const PRIME2: usize = 491;
const PRIME3: usize = 487;
const PRIME4: usize = 503;
/// Rasters smaller than this (in bytes) are walked pixel by pixel.
const MINPICTUREBYTES: usize = 3 * PRIME4;

/// A trained, frozen color map. Build one with [`NeuQuant::train`],
/// then read it back with [`NeuQuant::palette`] and [`NeuQuant::lookup`].
pub struct NeuQuant {
    /// Lattice points as `[r, g, b, original position]`. Sorted by green
    /// after training; the fourth slot remembers each point's palette index.
    network: [[i32; 4]; NETSIZE],
    /// For every green value, where in the sorted lattice to start scanning.
    netindex: [i32; 256],
}

impl NeuQuant {
    /// Trains the map on a raster and freezes it.
    ///
    /// `samplefac` is the sampling factor: 1 visits every pixel, larger
    /// values visit proportionally fewer. Training is deterministic for a
    /// given raster and factor. An empty raster leaves the initial
    /// grayscale lattice in place, which is still a valid palette.
    pub fn train(pixels: &[RGB8], samplefac: i32) -> Self {
        let samplefac = samplefac.max(1);
        let mut state = Learning::new();
        state.learn(pixels, samplefac);
        state.unbiasnet();
        let mut quant = NeuQuant { network: state.network, netindex: [0; 256] };
        quant.inxbuild();
        quant
    }

    /// The 256-entry palette, ordered by the points' original positions so
    /// that [`NeuQuant::lookup`] results index straight into it.
    pub fn palette(&self) -> Vec<RGB8> {
        let mut pal = vec![RGB8::new(0, 0, 0); NETSIZE];
        for p in &self.network {
            pal[p[3] as usize] = RGB8::new(p[0] as u8, p[1] as u8, p[2] as u8);
        }
        pal
    }

    /// Palette index of the lattice point nearest to `px` by Manhattan
    /// distance. Scans outward from the green-keyed starting position and
    /// stops a direction as soon as the green gap alone rules it out.
    pub fn lookup(&self, px: RGB8) -> u8 {
        let r = i32::from(px.r);
        let g = i32::from(px.g);
        let b = i32::from(px.b);
        // Larger than any reachable distance (3 * 255).
        let mut bestd = 1000;
        let mut best = 0;
        let mut i = self.netindex[g as usize];
        let mut j = i - 1;

        while i < NETSIZE as i32 || j >= 0 {
            if i < NETSIZE as i32 {
                let p = &self.network[i as usize];
                let mut dist = p[1] - g;
                if dist >= bestd {
                    i = NETSIZE as i32;
                } else {
                    i += 1;
                    if dist < 0 {
                        dist = -dist;
                    }
                    let mut a = p[0] - r;
                    if a < 0 {
                        a = -a;
                    }
                    dist += a;
                    if dist < bestd {
                        a = p[2] - b;
                        if a < 0 {
                            a = -a;
                        }
                        dist += a;
                        if dist < bestd {
                            bestd = dist;
                            best = p[3];
                        }
                    }
                }
            }
            if j >= 0 {
                let p = &self.network[j as usize];
                let mut dist = g - p[1];
                if dist >= bestd {
                    j = -1;
                } else {
                    j -= 1;
                    if dist < 0 {
                        dist = -dist;
                    }
                    let mut a = p[0] - r;
                    if a < 0 {
                        a = -a;
                    }
                    dist += a;
                    if dist < bestd {
                        a = p[2] - b;
                        if a < 0 {
                            a = -a;
                        }
                        dist += a;
                        if dist < bestd {
                            bestd = dist;
                            best = p[3];
                        }
                    }
                }
            }
        }
        best as u8
    }

    /// Builds `netindex` by selection-sorting the lattice on green, keeping
    /// each point's original position in its fourth slot.
    fn inxbuild(&mut self) {
        let mut previouscol = 0;
        let mut startpos = 0;
        for i in 0..NETSIZE {
            let mut smallpos = i;
            let mut smallval = self.network[i][1];
            for j in i + 1..NETSIZE {
                if self.network[j][1] < smallval {
                    smallpos = j;
                    smallval = self.network[j][1];
                }
            }
            if i != smallpos {
                self.network.swap(i, smallpos);
            }
            if smallval != previouscol {
                self.netindex[previouscol as usize] = (startpos + i as i32) >> 1;
                for j in previouscol + 1..smallval {
                    self.netindex[j as usize] = i as i32;
                }
                previouscol = smallval;
                startpos = i as i32;
            }
        }
        self.netindex[previouscol as usize] = (startpos + MAXNETPOS) >> 1;
        for j in previouscol + 1..256 {
            self.netindex[j as usize] = MAXNETPOS;
        }
    }
}

/// Mutable training state. Only lives inside [`NeuQuant::train`].
struct Learning {
    network: [[i32; 4]; NETSIZE],
    bias: [i32; NETSIZE],
    freq: [i32; NETSIZE],
    radpower: [i32; NETSIZE >> 3],
}

impl Learning {
    fn new() -> Self {
        let mut state = Learning {
            network: [[0; 4]; NETSIZE],
            bias: [0; NETSIZE],
            freq: [0; NETSIZE],
            radpower: [0; NETSIZE >> 3],
        };
        for i in 0..NETSIZE {
            // Spread the lattice along the gray diagonal.
            let v = ((i as i32) << (NETBIASSHIFT + 8)) / NETSIZE as i32;
            state.network[i] = [v, v, v, 0];
            state.freq[i] = INTBIAS / NETSIZE as i32;
        }
        state
    }

    fn learn(&mut self, pixels: &[RGB8], samplefac: i32) {
        let lengthcount = pixels.len() * 3;
        let alphadec = 30 + (samplefac - 1) / 3;
        let samplepixels = lengthcount / (3 * samplefac as usize);
        let mut delta = samplepixels / NCYCLES as usize;
        if delta == 0 {
            delta = 1;
        }
        let mut alpha = INITALPHA;
        let mut radius = INITRADIUS;
        let mut rad = radius >> RADIUSBIASSHIFT;
        if rad <= 1 {
            rad = 0;
        }
        self.fill_radpower(rad, alpha);

        // The stride stays coprime with the raster length, so the walk
        // visits a spread of pixels instead of one column.
        let step = if lengthcount < MINPICTUREBYTES {
            1
        } else if lengthcount % PRIME1 != 0 {
            PRIME1
        } else if lengthcount % PRIME2 != 0 {
            PRIME2
        } else if lengthcount % PRIME3 != 0 {
            PRIME3
        } else {
            PRIME4
        };

        let mut pos = 0;
        for i in 1..=samplepixels {
            let px = pixels[pos];
            let r = i32::from(px.r) << NETBIASSHIFT;
            let g = i32::from(px.g) << NETBIASSHIFT;
            let b = i32::from(px.b) << NETBIASSHIFT;
            let winner = self.contest(r, g, b);
            self.altersingle(alpha, winner, r, g, b);
            if rad != 0 {
                self.alterneigh(rad, winner as i32, r, g, b);
            }

            pos += step;
            if pos >= pixels.len() {
                pos -= pixels.len();
            }
            if i % delta == 0 {
                alpha -= alpha / alphadec;
                radius -= radius / RADIUSDEC;
                rad = radius >> RADIUSBIASSHIFT;
                if rad <= 1 {
                    rad = 0;
                }
                self.fill_radpower(rad, alpha);
            }
        }
    }

    fn fill_radpower(&mut self, rad: i32, alpha: i32) {
        for i in 0..rad {
            self.radpower[i as usize] =
                alpha * (((rad * rad - i * i) * RADBIAS) / (rad * rad));
        }
    }

    /// Finds the best-matching point, biased so that rarely-winning points
    /// get a chance, and updates every point's bias and frequency.
    fn contest(&mut self, r: i32, g: i32, b: i32) -> usize {
        let mut bestd = i32::MAX;
        let mut bestbiasd = i32::MAX;
        let mut bestpos = 0;
        let mut bestbiaspos = 0;
        for i in 0..NETSIZE {
            let p = &self.network[i];
            let dist = (p[0] - r).abs() + (p[1] - g).abs() + (p[2] - b).abs();
            if dist < bestd {
                bestd = dist;
                bestpos = i;
            }
            let biasdist = dist - (self.bias[i] >> (INTBIASSHIFT - NETBIASSHIFT));
            if biasdist < bestbiasd {
                bestbiasd = biasdist;
                bestbiaspos = i;
            }
            let betafreq = self.freq[i] >> BETASHIFT;
            self.freq[i] -= betafreq;
            self.bias[i] += betafreq << GAMMASHIFT;
        }
        self.freq[bestpos] += BETA;
        self.bias[bestpos] -= BETAGAMMA;
        bestbiaspos
    }

    /// Moves point `i` toward the sample by a factor of `alpha / INITALPHA`.
    fn altersingle(&mut self, alpha: i32, i: usize, r: i32, g: i32, b: i32) {
        let p = &mut self.network[i];
        p[0] -= alpha * (p[0] - r) / INITALPHA;
        p[1] -= alpha * (p[1] - g) / INITALPHA;
        p[2] -= alpha * (p[2] - b) / INITALPHA;
    }

    /// Moves neighbors of point `i` toward the sample, with strength
    /// falling off quadratically over the radius.
    fn alterneigh(&mut self, rad: i32, i: i32, r: i32, g: i32, b: i32) {
        let lo = (i - rad).max(-1);
        let hi = (i + rad).min(NETSIZE as i32);
        let mut j = i + 1;
        let mut k = i - 1;
        let mut m = 1;
        while j < hi || k > lo {
            let a = self.radpower[m];
            m += 1;
            if j < hi {
                let p = &mut self.network[j as usize];
                p[0] -= a * (p[0] - r) / ALPHARADBIAS;
                p[1] -= a * (p[1] - g) / ALPHARADBIAS;
                p[2] -= a * (p[2] - b) / ALPHARADBIAS;
                j += 1;
            }
            if k > lo {
                let p = &mut self.network[k as usize];
                p[0] -= a * (p[0] - r) / ALPHARADBIAS;
                p[1] -= a * (p[1] - g) / ALPHARADBIAS;
                p[2] -= a * (p[2] - b) / ALPHARADBIAS;
                k -= 1;
            }
        }
    }

    /// Drops the fractional bits and records each point's position so the
    /// sort in `inxbuild` can be undone when reading the palette out.
    fn unbiasnet(&mut self) {
        for (i, p) in self.network.iter_mut().enumerate() {
            p[0] >>= NETBIASSHIFT;
            p[1] >>= NETBIASSHIFT;
            p[2] >>= NETBIASSHIFT;
            p[3] = i as i32;
        }
    }
}
