// Braille dot canvas for the play field
// One terminal cell holds a 2x4 grid of dots, so the field gets twice the
// horizontal and four times the vertical resolution of the cell grid.

// 3x5 digit glyphs, one row per entry, high bit on the left
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

// Each glyph pixel becomes a DIGIT_SCALE x DIGIT_SCALE block of dots
pub const DIGIT_SCALE: usize = 3;
pub const DIGIT_WIDTH: usize = 3 * DIGIT_SCALE;
pub const DIGIT_HEIGHT: usize = 5 * DIGIT_SCALE;

pub struct BrailleCanvas {
    cols: usize,
    rows: usize,
    cells: Vec<u8>,
}

impl BrailleCanvas {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![0; cols * rows],
        }
    }

    pub fn pixel_width(&self) -> usize {
        self.cols * 2
    }

    pub fn pixel_height(&self) -> usize {
        self.rows * 4
    }

    /// Out-of-range dots are dropped
    pub fn set_pixel(&mut self, x: usize, y: usize) {
        let (col, row) = (x / 2, y / 4);
        if col >= self.cols || row >= self.rows {
            return;
        }
        // Unicode braille bit order: dots 1-3 and 7 down the left column, 4-6 and 8 down the right
        let bit = match (x % 2, y % 4) {
            (0, 3) => 6,
            (1, 3) => 7,
            (0, dy) => dy,
            (_, dy) => dy + 3,
        };
        self.cells[row * self.cols + col] |= 1 << bit;
    }

    pub fn fill_rect(&mut self, x: usize, y: usize, width: usize, height: usize) {
        for py in y..y + height {
            for px in x..x + width {
                self.set_pixel(px, py);
            }
        }
    }

    pub fn outline_rect(&mut self, x: usize, y: usize, width: usize, height: usize) {
        if width == 0 || height == 0 {
            return;
        }
        for px in x..x + width {
            self.set_pixel(px, y);
            self.set_pixel(px, y + height - 1);
        }
        for py in y..y + height {
            self.set_pixel(x, py);
            self.set_pixel(x + width - 1, py);
        }
    }

    pub fn horizontal_line(&mut self, y: usize) {
        for x in 0..self.pixel_width() {
            self.set_pixel(x, y);
        }
    }

    /// Dashed vertical line from `top`, `length` dots long
    pub fn dashed_vertical(&mut self, x: usize, top: usize, length: usize) {
        for y in (top..top + length).step_by(4) {
            self.set_pixel(x, y);
            self.set_pixel(x, y + 1);
        }
    }

    /// Draws `value` in block digits with its top-left corner at (x, y)
    pub fn draw_number(&mut self, value: u8, x: usize, y: usize) {
        let text = value.to_string();
        for (i, ch) in text.bytes().enumerate() {
            let glyph = &DIGITS[(ch - b'0') as usize];
            let left = x + i * (DIGIT_WIDTH + DIGIT_SCALE);
            for (gy, bits) in glyph.iter().enumerate() {
                for gx in 0..3 {
                    if bits & (0b100 >> gx) != 0 {
                        self.fill_rect(
                            left + gx * DIGIT_SCALE,
                            y + gy * DIGIT_SCALE,
                            DIGIT_SCALE,
                            DIGIT_SCALE,
                        );
                    }
                }
            }
        }
    }

    /// Width in dots of `value` as drawn by `draw_number`
    pub fn number_width(value: u8) -> usize {
        let digits = value.to_string().len();
        digits * DIGIT_WIDTH + (digits - 1) * DIGIT_SCALE
    }

    pub fn char_at(&self, col: usize, row: usize) -> char {
        if col >= self.cols || row >= self.rows {
            return ' ';
        }
        char::from_u32(0x2800 + self.cells[row * self.cols + col] as u32).unwrap_or(' ')
    }

    /// One string per terminal row
    pub fn lines(&self) -> Vec<String> {
        (0..self.rows)
            .map(|row| (0..self.cols).map(|col| self.char_at(col, row)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_positions() {
        let mut canvas = BrailleCanvas::new(1, 1);
        canvas.set_pixel(0, 0);
        assert_eq!(canvas.char_at(0, 0), '⠁');

        let mut canvas = BrailleCanvas::new(1, 1);
        canvas.set_pixel(1, 3);
        assert_eq!(canvas.char_at(0, 0), '⢀');

        let mut canvas = BrailleCanvas::new(1, 1);
        canvas.fill_rect(0, 0, 2, 4);
        assert_eq!(canvas.char_at(0, 0), '⣿');
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut canvas = BrailleCanvas::new(2, 1);
        canvas.set_pixel(4, 0);
        canvas.set_pixel(0, 4);
        assert_eq!(canvas.lines(), vec!["\u{2800}\u{2800}".to_string()]);
    }

    #[test]
    fn test_number_width() {
        assert_eq!(BrailleCanvas::number_width(7), DIGIT_WIDTH);
        assert_eq!(BrailleCanvas::number_width(10), 2 * DIGIT_WIDTH + DIGIT_SCALE);
    }
}
