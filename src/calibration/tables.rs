//! Factory calibration data for the pad pair
//!
//! Index is the distance to the conductor in millimetres, value is the mean pad
//! RMS measured at that distance. Both tables are non-increasing and end below
//! the out-of-range threshold of their context so every in-range reading
//! resolves to an entry.

/// Pad RMS against distance for a single wire (context A)
pub const WIRE_PAD_TABLE: [i32; 212] = [
    900, 865, 833, 804, 776, 750, 726, 703, 682, 662, 643, 625,
    608, 592, 577, 562, 549, 536, 523, 511, 500, 489, 479, 469,
    459, 450, 441, 433, 425, 417, 409, 402, 395, 388, 381, 375,
    369, 363, 357, 352, 346, 341, 336, 331, 326, 321, 317, 312,
    308, 304, 300, 296, 292, 288, 285, 281, 278, 274, 271, 268,
    265, 262, 259, 256, 253, 250, 247, 245, 242, 239, 237, 234,
    232, 230, 227, 225, 223, 221, 218, 216, 214, 212, 210, 208,
    206, 205, 203, 201, 199, 197, 196, 194, 192, 191, 189, 188,
    186, 184, 183, 181, 180, 179, 177, 176, 174, 173, 172, 170,
    169, 168, 167, 165, 164, 163, 162, 161, 160, 158, 157, 156,
    155, 154, 153, 152, 151, 150, 149, 148, 147, 146, 145, 144,
    143, 142, 142, 141, 140, 139, 138, 137, 136, 136, 135, 134,
    133, 132, 132, 131, 130, 129, 129, 128, 127, 126, 126, 125,
    124, 124, 123, 122, 122, 121, 120, 120, 119, 118, 118, 117,
    117, 116, 115, 115, 114, 114, 113, 112, 112, 111, 111, 110,
    110, 109, 109, 108, 108, 107, 107, 106, 106, 105, 105, 104,
    104, 103, 103, 102, 102, 101, 101, 100, 100, 100, 99, 99,
    98, 98, 97, 97, 97, 96, 96, 95,
];

/// Pad RMS against distance for a sheathed cable (context B)
pub const CABLE_PAD_TABLE: [i32; 151] = [
    500, 481, 463, 446, 431, 417, 403, 391, 379, 368, 357, 347,
    338, 329, 321, 312, 305, 298, 291, 284, 278, 272, 266, 260,
    255, 250, 245, 240, 236, 231, 227, 223, 219, 216, 212, 208,
    205, 202, 198, 195, 192, 189, 187, 184, 181, 179, 176, 174,
    171, 169, 167, 164, 162, 160, 158, 156, 154, 152, 151, 149,
    147, 145, 144, 142, 140, 139, 137, 136, 134, 133, 132, 130,
    129, 128, 126, 125, 124, 123, 121, 120, 119, 118, 117, 116,
    115, 114, 113, 112, 111, 110, 109, 108, 107, 106, 105, 104,
    103, 102, 102, 101, 100, 99, 98, 98, 97, 96, 95, 95,
    94, 93, 93, 92, 91, 91, 90, 89, 89, 88, 87, 87,
    86, 86, 85, 84, 84, 83, 83, 82, 82, 81, 81, 80,
    80, 79, 79, 78, 78, 77, 77, 76, 76, 75, 75, 74,
    74, 74, 73, 73, 72, 72, 71,
];
