/// Morse code lookup table
const MORSE_TABLE: &[(char, &str)] = &[
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('0', "-----"),
    ('.', ".-.-.-"),
    (',', "--..--"),
    ('?', "..--.."),
    ('/', "-..-."),
    ('=', "-...-"),
    ('+', ".-.-."),
    ('-', "-....-"),
    ('@', ".--.-."),
    ('!', "-.-.--"),
    ('\'', ".----."),
    ('(', "-.--."),
    (')', "-.--.-"),
    ('&', ".-..."),
    (':', "---..."),
    (';', "-.-.-."),
    ('"', ".-..-."),
    ('_', "..--.-"),
];

/// Longest codeword in the table
pub const MAX_CODEWORD_LEN: usize = 6;

/// Translate a codeword into its character. `None` means the sequence has
/// no mapping, which is an ordinary outcome for mis-keyed input.
pub fn translate(code: &str) -> Option<char> {
    MORSE_TABLE
        .iter()
        .find(|(_, pattern)| *pattern == code)
        .map(|(c, _)| *c)
}

/// Codeword for a character, case-insensitive
pub fn encode(ch: char) -> Option<&'static str> {
    let ch = ch.to_ascii_uppercase();
    MORSE_TABLE
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, pattern)| *pattern)
}
