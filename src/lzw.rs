//! LZW compression for GIF image data, in the classic GIFCOMPR shape:
//! an open-addressing hash table from `(prefix code, pixel)` to the next
//! code, variable code width, and 254-byte sub-block framing on the way out.

/// Codes never grow past 12 bits.
const BITS: i32 = 12;
/// Hash table size, a prime ~80% larger than the 4096-entry code space.
const HSIZE: usize = 5003;

/// Compresses an indexed raster into a complete GIF image data section:
/// the minimum-code-size byte, length-prefixed sub-blocks of at most 254
/// bytes, and the zero terminator. Never fails, even on an empty raster.
pub fn compress(pixels: &[u8], color_depth: u8) -> Vec<u8> {
    let min_code_size = color_depth.max(2);
    let mut out = Vec::with_capacity(pixels.len() / 2 + 16);
    out.push(min_code_size);
    Compressor::new(i32::from(min_code_size) + 1).run(pixels, &mut out);
    out.push(0);
    out
}

struct Compressor {
    htab: Vec<i32>,
    codetab: Vec<i32>,
    init_bits: i32,
    n_bits: i32,
    maxcode: i32,
    free_ent: i32,
    clear_flg: bool,
    clear_code: i32,
    eof_code: i32,
    cur_accum: u32,
    cur_bits: i32,
    accum: [u8; 256],
    a_count: usize,
}

impl Compressor {
    fn new(init_bits: i32) -> Self {
        let clear_code = 1 << (init_bits - 1);
        Compressor {
            htab: vec![-1; HSIZE],
            codetab: vec![0; HSIZE],
            init_bits,
            n_bits: init_bits,
            maxcode: (1 << init_bits) - 1,
            free_ent: clear_code + 2,
            clear_flg: false,
            clear_code,
            eof_code: clear_code + 1,
            cur_accum: 0,
            cur_bits: 0,
            accum: [0; 256],
            a_count: 0,
        }
    }

    fn run(mut self, pixels: &[u8], out: &mut Vec<u8>) {
        let mut hshift = 0;
        let mut fcode = HSIZE;
        while fcode < 65536 {
            hshift += 1;
            fcode *= 2;
        }
        let hshift = 8 - hshift;

        self.output(self.clear_code, out);
        let mut iter = pixels.iter();
        let mut ent = match iter.next() {
            Some(&px) => i32::from(px),
            None => {
                // An empty raster still gets a well-formed code stream.
                self.output(self.eof_code, out);
                return;
            }
        };

        'next_pixel: for &px in iter {
            let c = i32::from(px);
            let fcode = (c << BITS) + ent;
            let mut i = ((c << hshift) ^ ent) as usize;
            if self.htab[i] == fcode {
                ent = self.codetab[i];
                continue;
            }
            if self.htab[i] >= 0 {
                // Secondary hash, after G. Knott.
                let disp = if i == 0 { 1 } else { HSIZE - i };
                loop {
                    if i < disp {
                        i += HSIZE;
                    }
                    i -= disp;
                    if self.htab[i] == fcode {
                        ent = self.codetab[i];
                        continue 'next_pixel;
                    }
                    if self.htab[i] < 0 {
                        break;
                    }
                }
            }
            self.output(ent, out);
            ent = c;
            if self.free_ent < 1 << BITS {
                self.codetab[i] = self.free_ent;
                self.free_ent += 1;
                self.htab[i] = fcode;
            } else {
                self.clear_table(out);
            }
        }
        self.output(ent, out);
        self.output(self.eof_code, out);
    }

    /// Emits the clear code and starts the string table over.
    fn clear_table(&mut self, out: &mut Vec<u8>) {
        self.htab.fill(-1);
        self.free_ent = self.clear_code + 2;
        self.clear_flg = true;
        self.output(self.clear_code, out);
    }

    /// Packs one code, LSB first, at the current width. Widening to the
    /// next code size happens here, right after the code that filled the
    /// previous one went out.
    fn output(&mut self, code: i32, out: &mut Vec<u8>) {
        self.cur_accum &= (1u32 << self.cur_bits) - 1;
        if self.cur_bits > 0 {
            self.cur_accum |= (code as u32) << self.cur_bits;
        } else {
            self.cur_accum = code as u32;
        }
        self.cur_bits += self.n_bits;
        while self.cur_bits >= 8 {
            self.char_out((self.cur_accum & 0xFF) as u8, out);
            self.cur_accum >>= 8;
            self.cur_bits -= 8;
        }

        if self.free_ent > self.maxcode || self.clear_flg {
            if self.clear_flg {
                self.n_bits = self.init_bits;
                self.maxcode = (1 << self.n_bits) - 1;
                self.clear_flg = false;
            } else {
                self.n_bits += 1;
                self.maxcode = if self.n_bits == BITS {
                    1 << BITS
                } else {
                    (1 << self.n_bits) - 1
                };
            }
        }

        if code == self.eof_code {
            while self.cur_bits > 0 {
                self.char_out((self.cur_accum & 0xFF) as u8, out);
                self.cur_accum >>= 8;
                self.cur_bits -= 8;
            }
            self.flush(out);
        }
    }

    fn char_out(&mut self, c: u8, out: &mut Vec<u8>) {
        self.accum[self.a_count] = c;
        self.a_count += 1;
        if self.a_count >= 254 {
            self.flush(out);
        }
    }

    /// Writes the accumulated bytes as one length-prefixed sub-block.
    fn flush(&mut self, out: &mut Vec<u8>) {
        if self.a_count > 0 {
            out.push(self.a_count as u8);
            out.extend_from_slice(&self.accum[..self.a_count]);
            self.a_count = 0;
        }
    }
}
